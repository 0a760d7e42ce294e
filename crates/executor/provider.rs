use crate::{ReplayError, WorkItem};

/// Callback receiving the items of a provider, in order.
pub type Consumer<'a, T> = dyn FnMut(WorkItem<T>) -> Result<(), ReplayError> + 'a;

/// Source of work items.
///
/// `run` must deliver every item with block in `[from, to)` in ascending
/// (block, transaction) order and stop at the first error returned by the
/// consumer, propagating it unchanged.
pub trait Provider<T>: Send {
    fn run(&mut self, from: u64, to: u64, consumer: &mut Consumer<'_, T>)
    -> Result<(), ReplayError>;
}
