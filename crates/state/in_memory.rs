use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use tracing::debug;

use crate::journal::{Accounts, JournaledAccounts};
use crate::world_state::{WorldState, hash_accounts};
use crate::{ArchiveState, BulkLoad, MemoryUsage, SnapshotId, StateDb, StateError, VmState};

/// File holding the content of a directory-backed in-memory state-db.
pub const WORLD_STATE_FILE: &str = "world_state.json";

/// Fully in-memory state-db. When created with an archive, the committed
/// content at the end of every block is retained for historical queries.
///
/// A state-db opened on a directory loads its content from
/// [`WORLD_STATE_FILE`] and writes it back on close.
#[derive(Debug, Default)]
pub struct InMemoryStateDb {
    state: JournaledAccounts,
    archive: Option<BTreeMap<u64, Arc<Accounts>>>,
    open_block: Option<u64>,
    open_transaction: Option<u32>,
    directory: Option<PathBuf>,
    closed: bool,
}

impl InMemoryStateDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive() -> Self {
        Self {
            archive: Some(BTreeMap::new()),
            ..Default::default()
        }
    }

    pub fn from_world_state(world_state: WorldState, archive: bool) -> Self {
        let mut db = if archive {
            Self::with_archive()
        } else {
            Self::new()
        };
        db.state = JournaledAccounts::new(world_state.into_iter().collect());
        db
    }

    pub fn open(directory: &Path, archive: bool) -> Result<Self, StateError> {
        let file = directory.join(WORLD_STATE_FILE);
        let world_state = if file.exists() {
            WorldState::from_json_file(&file)?
        } else {
            WorldState::new()
        };
        debug!(directory = %directory.display(), accounts = world_state.len(), "Opened in-memory state-db");
        let mut db = Self::from_world_state(world_state, archive);
        db.directory = Some(directory.to_path_buf());
        Ok(db)
    }

    /// Copy of the current content.
    pub fn world_state(&self) -> WorldState {
        self.state
            .accounts()
            .iter()
            .map(|(address, account)| (*address, account.clone()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn record_archive_block(&mut self, block: u64) {
        if let Some(archive) = self.archive.as_mut() {
            archive.insert(block, Arc::new(self.state.accounts().clone()));
        }
    }
}

impl VmState for InMemoryStateDb {
    fn exists(&self, address: &Address) -> bool {
        self.state.get(address).is_some()
    }

    fn get_balance(&self, address: &Address) -> U256 {
        self.state
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.state
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or_default()
    }

    fn get_code(&self, address: &Address) -> Bytes {
        self.state
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default()
    }

    fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        self.state
            .get(address)
            .and_then(|account| account.storage.get(key).copied())
            .unwrap_or_default()
    }

    fn create_account(&mut self, address: Address) {
        self.state.account_mut(address);
    }

    fn delete_account(&mut self, address: Address) {
        self.state.remove(address);
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.state.account_mut(address).balance = balance;
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.state.account_mut(address).nonce = nonce;
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.state.account_mut(address).code = code;
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        let account = self.state.account_mut(address);
        if value.is_zero() {
            account.storage.remove(&key);
        } else {
            account.storage.insert(key, value);
        }
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.state.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) -> Result<(), StateError> {
        self.state.revert_to_snapshot(id)
    }

    fn begin_transaction(&mut self, transaction: u32) -> Result<(), StateError> {
        if let Some(open) = self.open_transaction {
            return Err(StateError::TransactionAlreadyOpen(open));
        }
        self.open_transaction = Some(transaction);
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<(), StateError> {
        if self.open_transaction.take().is_none() {
            return Err(StateError::NoOpenTransaction);
        }
        self.state.commit();
        Ok(())
    }

    fn state_hash(&self) -> Result<H256, StateError> {
        Ok(hash_accounts(self.state.accounts().iter()))
    }
}

impl StateDb for InMemoryStateDb {
    fn begin_block(&mut self, block: u64) -> Result<(), StateError> {
        if self.closed {
            return Err(StateError::Closed);
        }
        if let Some(open) = self.open_block {
            return Err(StateError::BlockAlreadyOpen(open));
        }
        self.open_block = Some(block);
        Ok(())
    }

    fn end_block(&mut self) -> Result<(), StateError> {
        let block = self.open_block.take().ok_or(StateError::NoOpenBlock)?;
        self.state.commit();
        self.record_archive_block(block);
        Ok(())
    }

    fn get_archive_state(&self, block: u64) -> Result<Box<dyn ArchiveState>, StateError> {
        let archive = self.archive.as_ref().ok_or(StateError::ArchiveDisabled)?;
        // The open block and anything after it is not committed yet.
        if matches!(self.open_block, Some(open) if block >= open) {
            return Err(StateError::BlockNotInArchive {
                requested: block,
                height: archive.keys().next_back().copied(),
            });
        }
        // Blocks without recorded content, skipped ones included, inherit the
        // closest earlier block; anything before the first recorded block is
        // the empty state.
        let accounts = archive
            .range(..=block)
            .next_back()
            .map(|(_, accounts)| Accounts::clone(accounts))
            .unwrap_or_default();
        debug!(block, "opening in-memory archive view");
        Ok(Box::new(InMemoryArchive {
            block,
            view: InMemoryStateDb {
                state: JournaledAccounts::new(accounts),
                ..Default::default()
            },
        }))
    }

    fn get_archive_block_height(&self) -> Result<Option<u64>, StateError> {
        let archive = self.archive.as_ref().ok_or(StateError::ArchiveDisabled)?;
        Ok(archive.keys().next_back().copied())
    }

    fn start_bulk_load(&mut self, block: u64) -> Result<Box<dyn BulkLoad + '_>, StateError> {
        if self.closed {
            return Err(StateError::Closed);
        }
        if let Some(open) = self.open_block {
            return Err(StateError::BlockAlreadyOpen(open));
        }
        Ok(Box::new(InMemoryBulkLoad { db: self, block }))
    }

    fn memory_usage(&self) -> Option<MemoryUsage> {
        let accounts = self.state.accounts();
        let mut used_bytes = 0u64;
        for account in accounts.values() {
            used_bytes += (size_of::<Address>() + size_of::<crate::Account>()) as u64;
            used_bytes += account.code.len() as u64;
            used_bytes += (account.storage.len() * 2 * size_of::<H256>()) as u64;
        }
        let archived_blocks = self.archive.as_ref().map(|a| a.len()).unwrap_or_default();
        Some(MemoryUsage {
            used_bytes,
            breakdown: format!(
                "accounts: {}, archived blocks: {archived_blocks}",
                accounts.len()
            ),
        })
    }

    fn close(&mut self) -> Result<(), StateError> {
        if self.closed {
            return Err(StateError::Closed);
        }
        self.closed = true;
        if let Some(directory) = &self.directory {
            self.world_state()
                .write_json_file(&directory.join(WORLD_STATE_FILE))?;
        }
        Ok(())
    }
}

struct InMemoryArchive {
    block: u64,
    view: InMemoryStateDb,
}

impl VmState for InMemoryArchive {
    fn exists(&self, address: &Address) -> bool {
        self.view.exists(address)
    }

    fn get_balance(&self, address: &Address) -> U256 {
        self.view.get_balance(address)
    }

    fn get_nonce(&self, address: &Address) -> u64 {
        self.view.get_nonce(address)
    }

    fn get_code(&self, address: &Address) -> Bytes {
        self.view.get_code(address)
    }

    fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        self.view.get_storage(address, key)
    }

    fn create_account(&mut self, address: Address) {
        self.view.create_account(address)
    }

    fn delete_account(&mut self, address: Address) {
        self.view.delete_account(address)
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.view.set_balance(address, balance)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.view.set_nonce(address, nonce)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.view.set_code(address, code)
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        self.view.set_storage(address, key, value)
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.view.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: SnapshotId) -> Result<(), StateError> {
        self.view.revert_to_snapshot(id)
    }

    fn begin_transaction(&mut self, transaction: u32) -> Result<(), StateError> {
        self.view.begin_transaction(transaction)
    }

    fn end_transaction(&mut self) -> Result<(), StateError> {
        self.view.end_transaction()
    }

    fn state_hash(&self) -> Result<H256, StateError> {
        self.view.state_hash()
    }
}

impl ArchiveState for InMemoryArchive {
    fn block(&self) -> u64 {
        self.block
    }

    fn release(self: Box<Self>) -> Result<(), StateError> {
        Ok(())
    }
}

struct InMemoryBulkLoad<'a> {
    db: &'a mut InMemoryStateDb,
    block: u64,
}

impl BulkLoad for InMemoryBulkLoad<'_> {
    fn create_account(&mut self, address: Address) {
        self.db.create_account(address)
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.db.set_balance(address, balance)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.db.set_nonce(address, nonce)
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.db.set_code(address, code)
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        self.db.set_storage(address, key, value)
    }

    fn close(self: Box<Self>) -> Result<(), StateError> {
        self.db.state.commit();
        self.db.record_archive_block(self.block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Account;

    fn address(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn archive_keeps_block_content() {
        let mut db = InMemoryStateDb::with_archive();
        db.begin_block(1).unwrap();
        db.begin_transaction(0).unwrap();
        db.set_balance(address(1), U256::from(100));
        db.end_transaction().unwrap();
        db.end_block().unwrap();

        db.begin_block(2).unwrap();
        db.begin_transaction(0).unwrap();
        db.set_balance(address(1), U256::from(50));
        db.end_transaction().unwrap();
        db.end_block().unwrap();

        let archive = db.get_archive_state(1).unwrap();
        assert_eq!(archive.get_balance(&address(1)), U256::from(100));
        archive.release().unwrap();
        assert_eq!(db.get_balance(&address(1)), U256::from(50));
        assert_eq!(db.get_archive_block_height().unwrap(), Some(2));
    }

    #[test]
    fn archive_modifications_are_not_persisted() {
        let mut db = InMemoryStateDb::with_archive();
        db.begin_block(1).unwrap();
        db.set_nonce(address(1), 4);
        db.end_block().unwrap();

        let mut archive = db.get_archive_state(1).unwrap();
        archive.set_nonce(address(1), 9);
        assert_eq!(archive.get_nonce(&address(1)), 9);
        archive.release().unwrap();

        assert_eq!(db.get_archive_state(1).unwrap().get_nonce(&address(1)), 4);
    }

    #[test]
    fn archive_rejects_uncommitted_blocks() {
        let mut db = InMemoryStateDb::with_archive();
        db.begin_block(3).unwrap();
        db.end_block().unwrap();
        db.begin_block(4).unwrap();
        assert!(matches!(
            db.get_archive_state(4),
            Err(StateError::BlockNotInArchive {
                requested: 4,
                height: Some(3)
            })
        ));
        assert!(db.get_archive_state(3).is_ok());
    }

    #[test]
    fn skipped_blocks_resolve_to_the_last_committed_one() {
        let mut db = InMemoryStateDb::with_archive();
        db.begin_block(10).unwrap();
        db.begin_transaction(0).unwrap();
        db.set_balance(address(1), U256::from(5));
        db.end_transaction().unwrap();
        db.end_block().unwrap();

        let archive = db.get_archive_state(11).unwrap();
        assert_eq!(archive.block(), 11);
        assert_eq!(archive.get_balance(&address(1)), U256::from(5));
        archive.release().unwrap();
    }

    #[test]
    fn archive_disabled_by_default() {
        let db = InMemoryStateDb::new();
        assert!(matches!(
            db.get_archive_state(0),
            Err(StateError::ArchiveDisabled)
        ));
    }

    #[test]
    fn bulk_load_records_block() {
        let mut db = InMemoryStateDb::with_archive();
        let alloc = WorldState::new().with_account(address(3), Account::new(U256::from(7), 1));
        let mut loader = db.start_bulk_load(9).unwrap();
        crate::bulk_load_world_state(loader.as_mut(), &alloc);
        loader.close().unwrap();

        assert_eq!(db.get_archive_block_height().unwrap(), Some(9));
        assert_eq!(db.world_state(), alloc);
        assert_eq!(db.state_hash().unwrap(), alloc.hash());
    }

    #[test]
    fn nested_blocks_and_transactions_are_rejected() {
        let mut db = InMemoryStateDb::new();
        db.begin_block(1).unwrap();
        assert!(matches!(
            db.begin_block(2),
            Err(StateError::BlockAlreadyOpen(1))
        ));
        db.begin_transaction(0).unwrap();
        assert!(matches!(
            db.begin_transaction(1),
            Err(StateError::TransactionAlreadyOpen(0))
        ));
        db.end_transaction().unwrap();
        assert!(matches!(
            db.end_transaction(),
            Err(StateError::NoOpenTransaction)
        ));
    }
}
