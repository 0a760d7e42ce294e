use replay_executor::{Consumer, Provider, ReplayError, WorkItem};

/// Serves items held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecProvider<T> {
    items: Vec<WorkItem<T>>,
}

impl<T> VecProvider<T> {
    /// Items are sorted by block and transaction; the relative order of
    /// duplicates is kept.
    pub fn new(mut items: Vec<WorkItem<T>>) -> Self {
        items.sort_by_key(|item| (item.block, item.transaction));
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone + Send> Provider<T> for VecProvider<T> {
    fn run(
        &mut self,
        from: u64,
        to: u64,
        consumer: &mut Consumer<'_, T>,
    ) -> Result<(), ReplayError> {
        let start = self.items.partition_point(|item| item.block < from);
        for item in &self.items[start..] {
            if item.block >= to {
                break;
            }
            consumer(item.clone())?;
        }
        Ok(())
    }
}
