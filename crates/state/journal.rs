use std::collections::BTreeMap;

use ethereum_types::Address;

use crate::{SnapshotId, StateError, world_state::Account};

pub(crate) type Accounts = BTreeMap<Address, Account>;

/// Account map with an undo journal. Every mutation records the previous
/// account content so snapshots can be reverted; `commit` forgets the journal.
#[derive(Debug, Default, Clone)]
pub(crate) struct JournaledAccounts {
    accounts: Accounts,
    journal: Vec<(Address, Option<Account>)>,
    snapshots: Vec<usize>,
}

impl JournaledAccounts {
    pub fn new(accounts: Accounts) -> Self {
        Self {
            accounts,
            ..Default::default()
        }
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn account_mut(&mut self, address: Address) -> &mut Account {
        self.record(address);
        self.accounts.entry(address).or_default()
    }

    pub fn remove(&mut self, address: Address) {
        self.record(address);
        self.accounts.remove(&address);
    }

    pub fn snapshot(&mut self) -> SnapshotId {
        self.snapshots.push(self.journal.len());
        self.snapshots.len() - 1
    }

    pub fn revert_to_snapshot(&mut self, id: SnapshotId) -> Result<(), StateError> {
        let Some(&length) = self.snapshots.get(id) else {
            return Err(StateError::InvalidSnapshot(id));
        };
        while self.journal.len() > length {
            let Some((address, previous)) = self.journal.pop() else {
                break;
            };
            match previous {
                Some(account) => self.accounts.insert(address, account),
                None => self.accounts.remove(&address),
            };
        }
        self.snapshots.truncate(id);
        Ok(())
    }

    pub fn commit(&mut self) {
        self.journal.clear();
        self.snapshots.clear();
    }

    fn record(&mut self, address: Address) {
        // Nothing to undo to when no snapshot is active.
        if self.snapshots.is_empty() {
            return;
        }
        let previous = self.accounts.get(&address).cloned();
        self.journal.push((address, previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::U256;

    #[test]
    fn revert_restores_previous_content() {
        let address = Address::from_low_u64_be(7);
        let mut accounts = JournaledAccounts::default();
        accounts.account_mut(address).balance = U256::from(10);

        let snapshot = accounts.snapshot();
        accounts.account_mut(address).balance = U256::from(20);
        accounts.account_mut(Address::from_low_u64_be(8)).nonce = 3;
        accounts.revert_to_snapshot(snapshot).unwrap();

        assert_eq!(accounts.get(&address).unwrap().balance, U256::from(10));
        assert!(accounts.get(&Address::from_low_u64_be(8)).is_none());
    }

    #[test]
    fn nested_snapshots_revert_independently() {
        let address = Address::from_low_u64_be(7);
        let mut accounts = JournaledAccounts::default();

        let outer = accounts.snapshot();
        accounts.account_mut(address).nonce = 1;
        let inner = accounts.snapshot();
        accounts.account_mut(address).nonce = 2;

        accounts.revert_to_snapshot(inner).unwrap();
        assert_eq!(accounts.get(&address).unwrap().nonce, 1);
        accounts.revert_to_snapshot(outer).unwrap();
        assert!(accounts.get(&address).is_none());
        assert!(matches!(
            accounts.revert_to_snapshot(inner),
            Err(StateError::InvalidSnapshot(1))
        ));
    }
}
