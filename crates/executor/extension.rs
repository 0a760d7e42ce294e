use crate::{Context, Cursor, ReplayError};

/// Hooks around the run, each block and each transaction. Pre hooks run in
/// registration order, post hooks in reverse order.
///
/// Every hook defaults to a no-op so implementations only override what they
/// observe.
pub trait Extension<T> {
    fn pre_run(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        Ok(())
    }

    /// Always invoked exactly once, whether or not the run failed. `err` is
    /// the failure that ended the run, if any.
    fn post_run(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    fn pre_block(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        Ok(())
    }

    fn post_block(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    fn pre_transaction(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        Ok(())
    }

    fn post_transaction(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        Ok(())
    }
}

/// Extensions in onion order: the first one wraps every other.
pub type ExtensionList<T> = Vec<Box<dyn Extension<T>>>;

/// Delivers one hook to every extension in registration order. A failing
/// extension does not prevent the remaining ones from observing the event;
/// all failures are joined.
pub(crate) fn forward<T, F>(
    extensions: &mut [Box<dyn Extension<T>>],
    mut hook: F,
) -> Result<(), ReplayError>
where
    F: FnMut(&mut dyn Extension<T>) -> Result<(), ReplayError>,
{
    let errors = extensions
        .iter_mut()
        .filter_map(|extension| hook(extension.as_mut()).err())
        .collect();
    ReplayError::join(errors)
}

/// Same as [`forward`] in reverse registration order.
pub(crate) fn backward<T, F>(
    extensions: &mut [Box<dyn Extension<T>>],
    mut hook: F,
) -> Result<(), ReplayError>
where
    F: FnMut(&mut dyn Extension<T>) -> Result<(), ReplayError>,
{
    let errors = extensions
        .iter_mut()
        .rev()
        .filter_map(|extension| hook(extension.as_mut()).err())
        .collect();
    ReplayError::join(errors)
}
