use replay_executor::{Context, Cursor, Extension, ReplayError};

/// Opens and closes blocks on the live state-db.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockEventEmitter;

impl<T> Extension<T> for BlockEventEmitter {
    fn pre_block(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        ctx.require_state()?.begin_block(cursor.block)?;
        Ok(())
    }

    fn post_block(&mut self, _cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        ctx.require_state()?.end_block()?;
        Ok(())
    }
}

/// Opens and closes transactions on the live state-db.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionEventEmitter;

impl<T> Extension<T> for TransactionEventEmitter {
    fn pre_transaction(
        &mut self,
        cursor: Cursor<'_, T>,
        ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        ctx.require_state()?.begin_transaction(cursor.transaction)?;
        Ok(())
    }

    fn post_transaction(
        &mut self,
        _cursor: Cursor<'_, T>,
        ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        ctx.require_state()?.end_transaction()?;
        Ok(())
    }
}
