use replay_executor::{
    Context, ExecutionResult, FailureBudget, Processor, ReplayError, WorkItem,
};
use replay_state::VmState;
use tracing::trace;

use crate::{TxContext, apply_output_alloc, apply_transition};

/// State a [`TxProcessor`] executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxTarget {
    /// The live state-db; effects are committed.
    Live,
    /// The historical view of the parent block; effects are discarded.
    Archive,
}

/// Replays recorded transactions. Regular transactions run inside a snapshot
/// and are reverted on failure; pseudo transactions apply their output alloc
/// directly.
#[derive(Debug)]
pub struct TxProcessor {
    target: TxTarget,
    budget: FailureBudget,
}

impl TxProcessor {
    pub fn new(target: TxTarget, budget: FailureBudget) -> Self {
        Self { target, budget }
    }

    pub fn live(budget: FailureBudget) -> Self {
        Self::new(TxTarget::Live, budget)
    }

    pub fn archive(budget: FailureBudget) -> Self {
        Self::new(TxTarget::Archive, budget)
    }

    /// Number of execution failures tolerated so far.
    pub fn tolerated_failures(&self) -> usize {
        self.budget.recorded()
    }
}

impl<T: TxContext> Processor<T> for TxProcessor {
    fn process(&self, item: &WorkItem<T>, ctx: &mut Context) -> Result<(), ReplayError> {
        let outcome = match self.target {
            TxTarget::Live => run_on(ctx.require_state()?, item),
            TxTarget::Archive => {
                let archive = ctx.archive_mut().ok_or_else(|| {
                    ReplayError::Execution(format!("no archive state for block {}", item.block))
                })?;
                run_on(archive, item)
            }
        };

        match outcome {
            Ok(result) => {
                ctx.execution_result = Some(result);
                Ok(())
            }
            Err(err) => {
                ctx.execution_result = Some(ExecutionResult {
                    gas_used: item.data.gas_used(),
                    failed: true,
                });
                self.budget
                    .handle(err.at(item.block, item.transaction), ctx)
            }
        }
    }
}

fn run_on<S, T>(state: &mut S, item: &WorkItem<T>) -> Result<ExecutionResult, ReplayError>
where
    S: VmState + ?Sized,
    T: TxContext,
{
    if item.is_pseudo() {
        apply_output_alloc(state, item.data.output_alloc());
        return Ok(ExecutionResult::default());
    }
    execute(state, &item.data)
}

fn execute<S, T>(state: &mut S, tx: &T) -> Result<ExecutionResult, ReplayError>
where
    S: VmState + ?Sized,
    T: TxContext,
{
    let snapshot = state.snapshot();
    match apply_transition(state, tx) {
        Ok(gas_used) => Ok(ExecutionResult {
            gas_used,
            failed: false,
        }),
        Err(err) => {
            trace!(snapshot, %err, "Reverting failed transaction");
            state.revert_to_snapshot(snapshot)?;
            Err(err)
        }
    }
}
