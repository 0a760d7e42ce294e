use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("block {0} is already open")]
    BlockAlreadyOpen(u64),
    #[error("no block is open")]
    NoOpenBlock,
    #[error("transaction {0} is already open")]
    TransactionAlreadyOpen(u32),
    #[error("no transaction is open")]
    NoOpenTransaction,
    #[error("invalid snapshot id {0}")]
    InvalidSnapshot(usize),
    #[error("archive is not enabled on this state-db")]
    ArchiveDisabled,
    #[error("block {requested} is not present in the archive (height {height:?})")]
    BlockNotInArchive { requested: u64, height: Option<u64> },
    #[error("state-db is closed")]
    Closed,
    #[error("unsupported state-db implementation: {0}")]
    UnsupportedImpl(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
