use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::{Context, ReplayError};

/// Decides whether an execution failure aborts the run or is only reported.
/// Safe to share between workers.
#[derive(Debug, Default)]
pub struct FailureBudget {
    continue_on_failure: bool,
    /// Zero means unlimited.
    max_errors: usize,
    recorded: AtomicUsize,
}

impl FailureBudget {
    pub fn new(continue_on_failure: bool, max_errors: usize) -> Self {
        Self {
            continue_on_failure,
            max_errors,
            recorded: AtomicUsize::new(0),
        }
    }

    /// Every failure is fatal.
    pub fn fail_fast() -> Self {
        Self::new(false, 0)
    }

    /// Consumes one unit of the budget. Returns true when the failure must
    /// abort the run.
    pub fn is_fatal(&self) -> bool {
        if !self.continue_on_failure {
            return true;
        }
        if self.max_errors == 0 {
            self.recorded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.recorded
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_errors).then_some(n + 1)
            })
            .is_err()
    }

    /// Number of failures tolerated so far.
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Propagates `err` if it is fatal, otherwise forwards it to the error
    /// reporter of `ctx` and lets the run continue.
    pub fn handle(&self, err: ReplayError, ctx: &Context) -> Result<(), ReplayError> {
        if self.is_fatal() {
            return Err(err);
        }
        debug!(recorded = self.recorded(), "Tolerating execution failure");
        ctx.report_error(err);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_is_always_fatal() {
        let budget = FailureBudget::fail_fast();
        assert!(budget.is_fatal());
        assert_eq!(budget.recorded(), 0);
    }

    #[test]
    fn budget_is_exhausted_after_max_errors() {
        let budget = FailureBudget::new(true, 2);
        assert!(!budget.is_fatal());
        assert!(!budget.is_fatal());
        assert!(budget.is_fatal());
        assert_eq!(budget.recorded(), 2);
    }

    #[test]
    fn zero_max_is_unlimited() {
        let budget = FailureBudget::new(true, 0);
        for _ in 0..100 {
            assert!(!budget.is_fatal());
        }
        assert_eq!(budget.recorded(), 100);
    }
}
