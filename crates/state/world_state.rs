use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::StateError;

/// Account content as recorded in a world-state allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub code: Bytes,
    #[serde(default)]
    pub storage: BTreeMap<H256, H256>,
}

impl Account {
    pub fn new(balance: U256, nonce: u64) -> Self {
        Self {
            balance,
            nonce,
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_storage(mut self, key: H256, value: H256) -> Self {
        self.storage.insert(key, value);
        self
    }

    pub fn code_hash(&self) -> H256 {
        H256::from_slice(&Keccak256::digest(&self.code))
    }
}

/// A set of accounts keyed by address, used for recorded transaction inputs
/// and outputs as well as for priming a state-db.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState(BTreeMap<Address, Account>);

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, address: Address, account: Account) -> Self {
        self.0.insert(address, account);
        self
    }

    pub fn insert(&mut self, address: Address, account: Account) -> Option<Account> {
        self.0.insert(address, account)
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.0.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains_key(address)
    }

    pub fn remove(&mut self, address: &Address) -> Option<Account> {
        self.0.remove(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.0.iter()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, StateError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn write_json_file(&self, path: &Path) -> Result<(), StateError> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Keccak hash over the ordered account content. Two world states with
    /// equal content always produce the same hash.
    pub fn hash(&self) -> H256 {
        hash_accounts(self.0.iter())
    }
}

pub(crate) fn hash_accounts<'a>(accounts: impl Iterator<Item = (&'a Address, &'a Account)>) -> H256 {
    let mut hasher = Keccak256::new();
    for (address, account) in accounts {
        // Empty accounts are equivalent to absent ones.
        if account == &Account::default() {
            continue;
        }
        hasher.update(address.as_bytes());
        hasher.update(account.balance.to_big_endian());
        hasher.update(account.nonce.to_be_bytes());
        hasher.update(account.code_hash().as_bytes());
        for (key, value) in &account.storage {
            // Zero slots are equivalent to absent ones.
            if value.is_zero() {
                continue;
            }
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }
    }
    H256::from_slice(&hasher.finalize())
}

impl FromIterator<(Address, Account)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (Address, Account)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for WorldState {
    type Item = (Address, Account);
    type IntoIter = std::collections::btree_map::IntoIter<Address, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a WorldState {
    type Item = (&'a Address, &'a Account);
    type IntoIter = std::collections::btree_map::Iter<'a, Address, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
