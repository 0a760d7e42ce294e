use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use tracing::debug;

use crate::{ArchiveState, BulkLoad, MemoryUsage, SnapshotId, StateDb, StateError, VmState};

/// Proxy tracing every call made to the wrapped state-db at debug level
/// under the `state` target.
pub struct LoggingStateDb {
    inner: Box<dyn StateDb>,
}

impl LoggingStateDb {
    pub fn new(inner: Box<dyn StateDb>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> Box<dyn StateDb> {
        self.inner
    }
}

impl VmState for LoggingStateDb {
    fn exists(&self, address: &Address) -> bool {
        let res = self.inner.exists(address);
        debug!(target: "state", %address, res, "Exist");
        res
    }

    fn get_balance(&self, address: &Address) -> U256 {
        let res = self.inner.get_balance(address);
        debug!(target: "state", %address, %res, "GetBalance");
        res
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        let res = self.inner.get_nonce(address);
        debug!(target: "state", %address, res, "GetNonce");
        res
    }

    fn get_code(&self, address: &Address) -> Bytes {
        let res = self.inner.get_code(address);
        debug!(target: "state", %address, len = res.len(), "GetCode");
        res
    }

    fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        let res = self.inner.get_storage(address, key);
        debug!(target: "state", %address, ?key, ?res, "GetState");
        res
    }

    fn create_account(&mut self, address: Address) {
        debug!(target: "state", %address, "CreateAccount");
        self.inner.create_account(address)
    }

    fn delete_account(&mut self, address: Address) {
        debug!(target: "state", %address, "DeleteAccount");
        self.inner.delete_account(address)
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        debug!(target: "state", %address, %balance, "SetBalance");
        self.inner.set_balance(address, balance)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        debug!(target: "state", %address, nonce, "SetNonce");
        self.inner.set_nonce(address, nonce)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        debug!(target: "state", %address, len = code.len(), "SetCode");
        self.inner.set_code(address, code)
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        debug!(target: "state", %address, ?key, ?value, "SetState");
        self.inner.set_storage(address, key, value)
    }

    fn snapshot(&mut self) -> SnapshotId {
        let id = self.inner.snapshot();
        debug!(target: "state", id, "Snapshot");
        id
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) -> Result<(), StateError> {
        debug!(target: "state", id, "RevertToSnapshot");
        self.inner.revert_to_snapshot(id)
    }

    fn begin_transaction(&mut self, transaction: u32) -> Result<(), StateError> {
        debug!(target: "state", transaction, "BeginTransaction");
        self.inner.begin_transaction(transaction)
    }

    fn end_transaction(&mut self) -> Result<(), StateError> {
        debug!(target: "state", "EndTransaction");
        self.inner.end_transaction()
    }

    fn state_hash(&self) -> Result<H256, StateError> {
        let res = self.inner.state_hash();
        debug!(target: "state", ?res, "GetHash");
        res
    }
}

impl StateDb for LoggingStateDb {
    fn begin_block(&mut self, block: u64) -> Result<(), StateError> {
        debug!(target: "state", block, "BeginBlock");
        self.inner.begin_block(block)
    }

    fn end_block(&mut self) -> Result<(), StateError> {
        debug!(target: "state", "EndBlock");
        self.inner.end_block()
    }

    fn get_archive_state(&self, block: u64) -> Result<Box<dyn ArchiveState>, StateError> {
        debug!(target: "state", block, "GetArchiveState");
        self.inner.get_archive_state(block)
    }

    fn get_archive_block_height(&self) -> Result<Option<u64>, StateError> {
        let res = self.inner.get_archive_block_height();
        debug!(target: "state", ?res, "GetArchiveBlockHeight");
        res
    }

    fn start_bulk_load(&mut self, block: u64) -> Result<Box<dyn BulkLoad + '_>, StateError> {
        debug!(target: "state", block, "StartBulkLoad");
        self.inner.start_bulk_load(block)
    }

    fn memory_usage(&self) -> Option<MemoryUsage> {
        self.inner.memory_usage()
    }

    fn close(&mut self) -> Result<(), StateError> {
        debug!(target: "state", "Close");
        self.inner.close()
    }
}
