use replay_executor::{Context, Cursor, Extension, ReplayError};
use tracing::{info, warn};

/// Logs the memory usage reported by the state-db at the end of the run and,
/// optionally, after every block.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryUsagePrinter {
    per_block: bool,
    reports: usize,
}

impl MemoryUsagePrinter {
    pub fn new(per_block: bool) -> Self {
        Self {
            per_block,
            reports: 0,
        }
    }

    /// Number of usage reports logged so far.
    pub fn reports(&self) -> usize {
        self.reports
    }

    fn report(&mut self, block: u64, ctx: &Context) {
        match ctx.state().and_then(|state| state.memory_usage()) {
            Some(usage) => info!(block, "State-db memory usage: {usage}"),
            None => warn!(block, "State-db memory usage is not available"),
        }
        self.reports += 1;
    }
}

impl<T> Extension<T> for MemoryUsagePrinter {
    fn post_block(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        if self.per_block {
            self.report(cursor.block, ctx);
        }
        Ok(())
    }

    fn post_run(
        &mut self,
        cursor: Cursor<'_, T>,
        ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        self.report(cursor.block, ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use replay_state::InMemoryStateDb;

    use super::*;

    fn run_three_blocks(printer: &mut MemoryUsagePrinter) {
        let mut ctx = Context::new(Some(Box::new(InMemoryStateDb::new())));
        for block in 0..3 {
            Extension::<()>::post_block(printer, Cursor::at(block, 0), &mut ctx).unwrap();
        }
        Extension::<()>::post_run(printer, Cursor::at(3, 0), &mut ctx, None).unwrap();
    }

    #[test]
    fn reports_once_at_the_end_by_default() {
        let mut printer = MemoryUsagePrinter::default();
        run_three_blocks(&mut printer);
        assert_eq!(printer.reports(), 1);
    }

    #[test]
    fn reports_every_block_when_asked() {
        let mut printer = MemoryUsagePrinter::new(true);
        run_three_blocks(&mut printer);
        assert_eq!(printer.reports(), 4);
    }
}
