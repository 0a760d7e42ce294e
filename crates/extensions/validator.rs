use std::{collections::BTreeMap, path::Path};

use ethereum_types::H256;
use replay_executor::{Context, Cursor, Extension, FailureBudget, ReplayError, ValidationDiff};
use replay_processor::{TxContext, TxTarget};
use replay_state::{Account, VmState, WorldState};

/// Compares every account of `alloc` with its content in `state`. Accounts
/// of `state` not mentioned in `alloc` are not inspected.
pub fn diff_alloc<S: VmState + ?Sized>(state: &S, alloc: &WorldState) -> ValidationDiff {
    let mut diff = ValidationDiff::default();
    for (address, expected) in alloc {
        if !state.exists(address) {
            // An empty account and an absent one are indistinguishable.
            if *expected != Account::default() {
                diff.missing.push(format!("account {address:?}"));
            }
            continue;
        }
        let subject = format!("account {address:?}");
        let balance = state.get_balance(address);
        if balance != expected.balance {
            diff.mismatch(&subject, "balance", expected.balance, balance);
        }
        let nonce = state.get_nonce(address);
        if nonce != expected.nonce {
            diff.mismatch(&subject, "nonce", expected.nonce, nonce);
        }
        let code = state.get_code(address);
        if code != expected.code {
            diff.mismatch(
                &subject,
                "code",
                format!("{} bytes", expected.code.len()),
                format!("{} bytes", code.len()),
            );
        }
        for (key, value) in &expected.storage {
            let actual = state.get_storage(address, key);
            if actual != *value {
                diff.mismatch(
                    format!("{subject} slot {key:?}"),
                    "value",
                    format!("{value:?}"),
                    format!("{actual:?}"),
                );
            }
        }
    }
    diff
}

/// Checks that the recorded input alloc is contained in the state before a
/// transaction and the recorded output alloc after it.
pub struct TxValidator {
    target: TxTarget,
    budget: FailureBudget,
}

impl TxValidator {
    pub fn new(target: TxTarget, budget: FailureBudget) -> Self {
        Self { target, budget }
    }

    fn validate<T>(
        &self,
        cursor: Cursor<'_, T>,
        ctx: &mut Context,
        alloc: &WorldState,
        what: &str,
    ) -> Result<(), ReplayError> {
        let diff = match self.target {
            TxTarget::Live => diff_alloc(ctx.require_state()?, alloc),
            TxTarget::Archive => match ctx.archive() {
                Some(archive) => diff_alloc(archive, alloc),
                None => return Ok(()),
            },
        };
        match diff.into_result(format!("{what} alloc mismatch")) {
            Ok(()) => Ok(()),
            Err(err) => self
                .budget
                .handle(err.at(cursor.block, cursor.transaction), ctx),
        }
    }
}

impl<T: TxContext> Extension<T> for TxValidator {
    fn pre_transaction(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        let Some(tx) = cursor.data else {
            return Ok(());
        };
        self.validate(cursor, ctx, tx.input_alloc(), "input")
    }

    fn post_transaction(
        &mut self,
        cursor: Cursor<'_, T>,
        ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        let Some(tx) = cursor.data else {
            return Ok(());
        };
        // A tolerated failure was reverted, its output never materialised.
        if ctx.execution_result.is_some_and(|r| r.failed) {
            return Ok(());
        }
        self.validate(cursor, ctx, tx.output_alloc(), "output")
    }
}

/// Compares the state hash at the end of each block with a recorded value.
pub struct StateHashValidator {
    expected: BTreeMap<u64, H256>,
    budget: FailureBudget,
}

impl StateHashValidator {
    pub fn new(expected: BTreeMap<u64, H256>, budget: FailureBudget) -> Self {
        Self { expected, budget }
    }

    /// Loads a JSON object mapping block numbers to hashes.
    pub fn from_file(path: &Path, budget: FailureBudget) -> Result<Self, ReplayError> {
        let file = std::fs::File::open(path)?;
        let expected = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|err| ReplayError::Setup(format!("invalid state hash file: {err}")))?;
        Ok(Self::new(expected, budget))
    }
}

impl<T> Extension<T> for StateHashValidator {
    fn post_block(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        let Some(expected) = self.expected.get(&cursor.block) else {
            return Ok(());
        };
        let actual = ctx.require_state()?.state_hash()?;
        let mut diff = ValidationDiff::default();
        if actual != *expected {
            diff.mismatch(
                format!("block {}", cursor.block),
                "state hash",
                format!("{expected:?}"),
                format!("{actual:?}"),
            );
        }
        match diff.into_result(format!("state hash mismatch at block {}", cursor.block)) {
            Ok(()) => Ok(()),
            Err(err) => self.budget.handle(err, ctx),
        }
    }
}
