//! State-db contracts consumed by the replay executor, plus an in-memory
//! backend with archive support and a tracing proxy.

pub mod error;
mod in_memory;
mod journal;
mod logging;
pub mod serde_utils;
pub mod world_state;

use std::fmt;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

pub use error::StateError;
pub use in_memory::{InMemoryStateDb, WORLD_STATE_FILE};
pub use logging::LoggingStateDb;
pub use world_state::{Account, WorldState};

pub type SnapshotId = usize;

/// Operations shared by the live state and historical views: account access,
/// snapshots and transaction scoping.
pub trait VmState: Send {
    fn exists(&self, address: &Address) -> bool;
    fn get_balance(&self, address: &Address) -> U256;
    fn get_nonce(&self, address: &Address) -> u64;
    fn get_code(&self, address: &Address) -> Bytes;
    fn get_storage(&self, address: &Address, key: &H256) -> H256;

    fn create_account(&mut self, address: Address);
    fn delete_account(&mut self, address: Address);
    fn set_balance(&mut self, address: Address, balance: U256);
    fn set_nonce(&mut self, address: Address, nonce: u64);
    fn set_code(&mut self, address: Address, code: Bytes);
    fn set_storage(&mut self, address: Address, key: H256, value: H256);

    fn snapshot(&mut self) -> SnapshotId;
    fn revert_to_snapshot(&mut self, id: SnapshotId) -> Result<(), StateError>;

    fn begin_transaction(&mut self, transaction: u32) -> Result<(), StateError>;
    fn end_transaction(&mut self) -> Result<(), StateError>;

    /// Hash certifying the committed content of the state.
    fn state_hash(&self) -> Result<H256, StateError>;
}

/// Read-only, point-in-time view of the state at a historical block.
/// Transaction-local modifications are allowed but never persisted.
pub trait ArchiveState: VmState {
    fn block(&self) -> u64;

    /// Frees the resources bound by this view. Consumes the handle so it can
    /// only be released once.
    fn release(self: Box<Self>) -> Result<(), StateError>;
}

/// Efficient insertion of large amounts of data, appearing as if inserted in
/// a single block.
pub trait BulkLoad {
    fn create_account(&mut self, address: Address);
    fn set_balance(&mut self, address: Address, balance: U256);
    fn set_nonce(&mut self, address: Address, nonce: u64);
    fn set_code(&mut self, address: Address, code: Bytes);
    fn set_storage(&mut self, address: Address, key: H256, value: H256);
    fn close(self: Box<Self>) -> Result<(), StateError>;
}

/// The mutable state handle a replay run operates on.
pub trait StateDb: VmState {
    fn begin_block(&mut self, block: u64) -> Result<(), StateError>;
    fn end_block(&mut self) -> Result<(), StateError>;

    fn get_archive_state(&self, block: u64) -> Result<Box<dyn ArchiveState>, StateError>;
    /// Highest block available in the archive, `None` if the archive is empty.
    fn get_archive_block_height(&self) -> Result<Option<u64>, StateError>;

    /// Only one bulk load may be active at a time; the returned loader borrows
    /// the state exclusively.
    fn start_bulk_load(&mut self, block: u64) -> Result<Box<dyn BulkLoad + '_>, StateError>;

    fn memory_usage(&self) -> Option<MemoryUsage>;

    fn close(&mut self) -> Result<(), StateError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub breakdown: String,
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.used_bytes)?;
        if !self.breakdown.is_empty() {
            write!(f, "\n{}", self.breakdown)?;
        }
        Ok(())
    }
}

/// Writes every account of `alloc` into `loader`.
pub fn bulk_load_world_state(loader: &mut dyn BulkLoad, alloc: &WorldState) {
    for (address, account) in alloc {
        loader.create_account(*address);
        loader.set_balance(*address, account.balance);
        loader.set_nonce(*address, account.nonce);
        loader.set_code(*address, account.code.clone());
        for (key, value) in &account.storage {
            loader.set_storage(*address, *key, *value);
        }
    }
}
