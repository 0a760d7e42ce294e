use crate::{Context, ReplayError, WorkItem};

/// Applies the effect of a work item to the state.
///
/// Processors are shared with the warm-up workers of a parallel run and must
/// therefore be `Sync`.
pub trait Processor<T>: Sync {
    fn process(&self, item: &WorkItem<T>, ctx: &mut Context) -> Result<(), ReplayError>;

    /// Read-only preparation of `item` without access to the state, run on a
    /// worker thread ahead of `process`. Errors returned here are fatal.
    fn warm(&self, _item: &WorkItem<T>) -> Result<(), ReplayError> {
        Ok(())
    }
}
