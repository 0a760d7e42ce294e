//! Work item sources for the replay executor.

mod stochastic;
mod tx_log;
mod vec;

pub use stochastic::StochasticProvider;
pub use tx_log::{TxLogEntry, TxLogProvider, TxLogWriter};
pub use vec::VecProvider;
