//! Extensions plugged around replay runs: state-db lifecycle, event
//! emission, priming, progress reporting, error collection, profiling and
//! validation.

mod error_logger;
mod events;
mod memory;
mod primer;
mod profiler;
mod progress;
mod proxy;
mod statedb_manager;
mod validator;

pub use error_logger::ErrorLogger;
pub use events::{BlockEventEmitter, TransactionEventEmitter};
pub use memory::MemoryUsagePrinter;
pub use primer::StateDbPrimer;
pub use profiler::{BlockProfile, BlockRuntimeAndGasCollector};
pub use progress::{ProgressLogger, ProgressSummary};
pub use proxy::LoggingProxy;
pub use statedb_manager::{STATE_DB_INFO_FILE, StateDbInfo, StateDbManager, open_state_db};
pub use validator::{StateHashValidator, TxValidator, diff_alloc};
