use replay_state::WorldState;
use serde::{Deserialize, Serialize};

/// Payload of a replayable transaction.
pub trait TxContext: Send + Sync {
    /// Accounts read by the transaction, as they were before it ran.
    fn input_alloc(&self) -> &WorldState;
    /// The same accounts after the transaction completed.
    fn output_alloc(&self) -> &WorldState;
    fn gas_limit(&self) -> u64;
    fn gas_used(&self) -> u64;
}

/// A transaction as captured by the recorder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedTx {
    #[serde(default)]
    pub input_alloc: WorldState,
    #[serde(default)]
    pub output_alloc: WorldState,
    #[serde(default)]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_used: u64,
}

impl TxContext for RecordedTx {
    fn input_alloc(&self) -> &WorldState {
        &self.input_alloc
    }

    fn output_alloc(&self) -> &WorldState {
        &self.output_alloc
    }

    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    fn gas_used(&self) -> u64 {
        self.gas_used
    }
}
