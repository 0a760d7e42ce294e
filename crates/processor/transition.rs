use ethereum_types::H256;
use replay_executor::ReplayError;
use replay_state::{VmState, WorldState};

use crate::TxContext;

/// Writes every account of `alloc` into `state`, overwriting existing values.
pub fn apply_output_alloc<S: VmState + ?Sized>(state: &mut S, alloc: &WorldState) {
    for (address, account) in alloc {
        if !state.exists(address) {
            state.create_account(*address);
        }
        state.set_balance(*address, account.balance);
        state.set_nonce(*address, account.nonce);
        state.set_code(*address, account.code.clone());
        for (key, value) in &account.storage {
            state.set_storage(*address, *key, *value);
        }
    }
}

/// Replays the effect of `tx` on `state` and returns the gas it consumed.
///
/// Accounts read but absent from the output were destroyed by the
/// transaction, storage slots read but absent from the output were cleared.
/// Gas is charged after the writes, so a failing transaction leaves partial
/// writes behind for the caller to revert.
pub fn apply_transition<S, T>(state: &mut S, tx: &T) -> Result<u64, ReplayError>
where
    S: VmState + ?Sized,
    T: TxContext + ?Sized,
{
    let output = tx.output_alloc();
    for (address, before) in tx.input_alloc() {
        match output.get(address) {
            None => state.delete_account(*address),
            Some(after) => {
                for key in before.storage.keys() {
                    if !after.storage.contains_key(key) {
                        state.set_storage(*address, *key, H256::zero());
                    }
                }
            }
        }
    }
    apply_output_alloc(state, output);

    if tx.gas_used() > tx.gas_limit() {
        return Err(ReplayError::Execution(format!(
            "out of gas: used {} exceeds limit {}",
            tx.gas_used(),
            tx.gas_limit()
        )));
    }
    Ok(tx.gas_used())
}

#[cfg(test)]
mod tests {
    use ethereum_types::{Address, U256};
    use replay_state::{Account, InMemoryStateDb};

    use super::*;
    use crate::RecordedTx;

    #[test]
    fn transition_clears_dropped_accounts_and_slots() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        let slot = H256::from_low_u64_be(1);
        let before = WorldState::new()
            .with_account(a, Account::new(U256::from(10), 0).with_storage(slot, H256::repeat_byte(1)))
            .with_account(b, Account::new(U256::from(5), 0));
        let mut db = InMemoryStateDb::from_world_state(before.clone(), false);

        let tx = RecordedTx {
            input_alloc: before,
            output_alloc: WorldState::new().with_account(a, Account::new(U256::from(15), 1)),
            gas_limit: 21_000,
            gas_used: 21_000,
        };
        assert_eq!(apply_transition(&mut db, &tx).unwrap(), 21_000);

        assert!(!db.exists(&b));
        assert_eq!(db.get_balance(&a), U256::from(15));
        assert_eq!(db.get_nonce(&a), 1);
        assert_eq!(db.get_storage(&a, &slot), H256::zero());
    }

    #[test]
    fn exceeding_gas_limit_is_an_execution_error() {
        let mut db = InMemoryStateDb::new();
        let tx = RecordedTx {
            gas_limit: 100,
            gas_used: 101,
            ..Default::default()
        };
        let err = apply_transition(&mut db, &tx).unwrap_err();
        assert!(matches!(err, ReplayError::Execution(msg) if msg.contains("out of gas")));
    }
}
