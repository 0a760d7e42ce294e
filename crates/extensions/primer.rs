use std::path::Path;

use replay_executor::{Context, Cursor, Extension, ReplayError};
use replay_state::{WorldState, bulk_load_world_state};
use tracing::{debug, info};

/// Bulk-loads a world state into the state-db so that it reflects the block
/// preceding the first replayed one.
pub struct StateDbPrimer {
    alloc: WorldState,
}

impl StateDbPrimer {
    pub fn new(alloc: WorldState) -> Self {
        Self { alloc }
    }

    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        Ok(Self::new(WorldState::from_json_file(path)?))
    }
}

impl<T> Extension<T> for StateDbPrimer {
    fn pre_run(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        if self.alloc.is_empty() {
            debug!("Nothing to prime");
            return Ok(());
        }
        let block = cursor.block.saturating_sub(1);
        let state = ctx.require_state()?;
        let mut loader = state.start_bulk_load(block)?;
        bulk_load_world_state(loader.as_mut(), &self.alloc);
        loader.close()?;
        info!(accounts = self.alloc.len(), block, "Primed state-db");
        Ok(())
    }
}
