//! Transaction processors replaying recorded state transitions.

mod transition;
mod tx;
mod tx_processor;

pub use transition::{apply_output_alloc, apply_transition};
pub use tx::{RecordedTx, TxContext};
pub use tx_processor::{TxProcessor, TxTarget};
