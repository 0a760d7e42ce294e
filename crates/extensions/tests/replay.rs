use std::{collections::BTreeMap, path::Path, time::Duration};

use ethereum_types::{Address, H256, U256};
use replay_config::Config;
use replay_executor::{
    Context, Cursor, DecoratorChain, Executor, Extension, ExtensionList, FailureBudget,
    Granularity, PSEUDO_TX, Provider, ReplayError, RunParams, WorkItem,
};
use replay_extensions::{
    BlockEventEmitter, BlockRuntimeAndGasCollector, ErrorLogger, LoggingProxy,
    MemoryUsagePrinter, ProgressLogger, StateDbInfo, StateDbManager, StateDbPrimer,
    StateHashValidator, TransactionEventEmitter, TxValidator,
};
use replay_processor::{RecordedTx, TxProcessor, TxTarget};
use replay_providers::{StochasticProvider, VecProvider};
use replay_state::{Account, InMemoryStateDb, StateError, VmState, WorldState};

type Extensions = ExtensionList<RecordedTx>;

fn config(db_tmp: &Path) -> Config {
    Config {
        db_tmp: db_tmp.to_path_buf(),
        ..Default::default()
    }
}

fn lifecycle(cfg: &Config, genesis: Option<WorldState>) -> Extensions {
    let mut extensions: Extensions = vec![Box::new(StateDbManager::new(cfg))];
    if let Some(genesis) = genesis {
        extensions.push(Box::new(StateDbPrimer::new(genesis)));
    }
    extensions.push(Box::new(BlockEventEmitter));
    extensions.push(Box::new(TransactionEventEmitter));
    extensions
}

fn replay(
    provider: impl Provider<RecordedTx> + 'static,
    params: RunParams,
    extensions: &mut Extensions,
) -> Result<(), ReplayError> {
    let processor = TxProcessor::live(FailureBudget::fail_fast());
    Executor::new(Box::new(provider)).run(params, &processor, extensions)
}

fn kept_directories(db_tmp: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(db_tmp)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[test]
fn temporary_state_db_is_removed_after_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let provider = StochasticProvider::new(1, 5, 4);
    let mut extensions = lifecycle(&cfg, Some(provider.genesis()));
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::fail_fast(),
    )));
    extensions.push(Box::new(MemoryUsagePrinter::new(true)));

    replay(provider, RunParams::new(0, 4), &mut extensions).unwrap();

    assert!(kept_directories(tmp.path()).is_empty());
}

#[test]
fn kept_state_db_can_seed_the_next_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        keep_db: true,
        ..config(tmp.path())
    };
    let provider = StochasticProvider::new(9, 6, 3);
    let mut extensions = lifecycle(&cfg, Some(provider.genesis()));
    replay(provider.clone(), RunParams::new(0, 3), &mut extensions).unwrap();

    let kept = kept_directories(tmp.path());
    assert_eq!(kept.len(), 1);
    let info = StateDbInfo::read(&kept[0]).unwrap();
    assert_eq!(info.block, 2);
    assert_eq!(info.db_impl, "memory");
    let reopened = InMemoryStateDb::open(&kept[0], false).unwrap();
    assert_eq!(reopened.state_hash().unwrap(), info.root_hash);

    // Continue from block 3 on a copy of the kept state-db; the validator
    // proves the state matches what the workload expects.
    let resumed_tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        state_db_src: Some(kept[0].clone()),
        ..config(resumed_tmp.path())
    };
    let mut extensions = lifecycle(&cfg, None);
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::fail_fast(),
    )));
    replay(provider, RunParams::new(3, 5), &mut extensions).unwrap();
    assert!(kept_directories(resumed_tmp.path()).is_empty());
}

#[test]
fn kept_state_db_survives_a_failing_close() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        keep_db: true,
        ..config(tmp.path())
    };
    let mut manager = StateDbManager::new(&cfg);
    let mut ctx = Context::new(None);
    Extension::<RecordedTx>::pre_run(&mut manager, Cursor::at(0, 0), &mut ctx).unwrap();
    // A second close is refused by the state-db.
    ctx.require_state().unwrap().close().unwrap();

    let err = Extension::<RecordedTx>::post_run(&mut manager, Cursor::at(3, 0), &mut ctx, None)
        .unwrap_err();

    assert!(matches!(err, ReplayError::State(StateError::Closed)));
    assert_eq!(kept_directories(tmp.path()).len(), 1);
}

#[test]
fn source_state_db_must_precede_the_first_block() {
    let source = tempfile::tempdir().unwrap();
    StateDbInfo {
        db_impl: "memory".to_string(),
        archive_mode: false,
        block: 10,
        root_hash: H256::zero(),
    }
    .write(source.path())
    .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        state_db_src: Some(source.path().to_path_buf()),
        ..config(tmp.path())
    };
    let mut extensions = lifecycle(&cfg, None);
    let err = replay(VecProvider::default(), RunParams::new(5, 6), &mut extensions).unwrap_err();
    assert!(matches!(err, ReplayError::Setup(msg) if msg.contains("already contains block 10")));
}

fn alice() -> Address {
    Address::from_low_u64_be(0xa)
}

fn with_balance(balance: u64) -> WorldState {
    WorldState::new().with_account(alice(), Account::new(U256::from(balance), 0))
}

fn bogus_transfers() -> VecProvider<RecordedTx> {
    VecProvider::new(
        (0..3)
            .map(|tx| {
                WorkItem::new(
                    0,
                    tx,
                    RecordedTx {
                        input_alloc: with_balance(100 + u64::from(tx)),
                        output_alloc: with_balance(100 + u64::from(tx)),
                        gas_limit: 21_000,
                        gas_used: 21_000,
                    },
                )
            })
            .collect(),
    )
}

#[test]
fn validation_failure_is_fatal_with_coordinates() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let mut extensions = lifecycle(&cfg, Some(with_balance(100)));
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::fail_fast(),
    )));

    let err = replay(bogus_transfers(), RunParams::new(0, 1), &mut extensions).unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Block: 0 Transaction: 1; input alloc mismatch"), "{msg}");
    assert!(msg.contains("balance mismatch: expected 101, got 100"), "{msg}");
    assert!(kept_directories(tmp.path()).is_empty());
}

#[test]
fn tolerated_failures_are_written_to_the_error_log() {
    let tmp = tempfile::tempdir().unwrap();
    let error_log = tmp.path().join("errors.log");
    let db_tmp = tmp.path().join("db");
    let cfg = config(&db_tmp);
    let mut extensions = lifecycle(&cfg, Some(with_balance(100)));
    extensions.push(Box::new(ErrorLogger::new(1, Some(error_log.clone()))));
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::new(true, 0),
    )));

    replay(bogus_transfers(), RunParams::new(0, 1), &mut extensions).unwrap();

    let logged = std::fs::read_to_string(&error_log).unwrap();
    let failures: Vec<_> = logged.lines().filter(|l| l.starts_with("Block:")).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].starts_with("Block: 0 Transaction: 1; input alloc mismatch"));
    assert!(failures[1].starts_with("Block: 0 Transaction: 2; input alloc mismatch"));
}

#[test]
fn error_budget_turns_the_next_failure_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    let mut extensions = lifecycle(&cfg, Some(with_balance(100)));
    extensions.push(Box::new(ErrorLogger::new(1, None)));
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::new(true, 1),
    )));

    let err = replay(bogus_transfers(), RunParams::new(0, 1), &mut extensions).unwrap_err();
    assert!(err.to_string().starts_with("Block: 0 Transaction: 2"));
}

#[test]
fn state_hash_mismatch_is_reported_per_block() {
    let reward = |balance| RecordedTx {
        output_alloc: with_balance(balance),
        ..Default::default()
    };
    let provider = || {
        VecProvider::new(vec![
            WorkItem::new(0, PSEUDO_TX, reward(5)),
            WorkItem::new(1, PSEUDO_TX, reward(7)),
        ])
    };
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let expected = BTreeMap::from([(0, with_balance(5).hash()), (1, with_balance(7).hash())]);
    let mut extensions = lifecycle(&cfg, None);
    extensions.push(Box::new(StateHashValidator::new(
        expected,
        FailureBudget::fail_fast(),
    )));
    replay(provider(), RunParams::new(0, 2), &mut extensions).unwrap();

    let expected = BTreeMap::from([(0, with_balance(5).hash()), (1, H256::zero())]);
    let mut extensions = lifecycle(&cfg, None);
    extensions.push(Box::new(StateHashValidator::new(
        expected,
        FailureBudget::fail_fast(),
    )));
    let err = replay(provider(), RunParams::new(0, 2), &mut extensions).unwrap_err();
    assert!(matches!(err, ReplayError::Validation { .. }));
    assert!(err.to_string().starts_with("state hash mismatch at block 1"));
}

#[test]
fn block_profile_is_written_as_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let profile = tmp.path().join("blocks.csv");
    let cfg = config(tmp.path());
    let provider = StochasticProvider::new(2, 8, 5);
    let mut extensions = lifecycle(&cfg, Some(provider.genesis()));
    extensions.push(Box::new(ProgressLogger::new(Duration::from_millis(10), 1)));
    extensions.push(Box::new(BlockRuntimeAndGasCollector::new(profile.clone())));

    replay(provider, RunParams::new(0, 3), &mut extensions).unwrap();

    let csv = std::fs::read_to_string(&profile).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "block,txs,gas,runtime_us");
    for (block, line) in lines[1..].iter().enumerate() {
        let fields: Vec<_> = line.split(',').collect();
        assert_eq!(fields[0], block.to_string());
        assert_eq!(fields[1], "6");
        assert_eq!(fields[2], (5 * 21_000).to_string());
    }
}

fn final_root(workers: usize, granularity: Granularity, decorators: DecoratorChain) -> H256 {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        keep_db: true,
        archive_mode: true,
        ..config(tmp.path())
    };
    let provider = StochasticProvider::new(4, 20, 10);
    let mut extensions = lifecycle(&cfg, Some(provider.genesis()));
    extensions.push(Box::new(TxValidator::new(
        TxTarget::Live,
        FailureBudget::fail_fast(),
    )));
    replay(
        provider,
        RunParams::new(0, 6)
            .with_workers(workers)
            .with_granularity(granularity)
            .with_decorators(decorators),
        &mut extensions,
    )
    .unwrap();
    StateDbInfo::read(&kept_directories(tmp.path())[0])
        .unwrap()
        .root_hash
}

#[test]
fn parallel_and_decorated_runs_reach_the_same_state() {
    let sequential = final_root(1, Granularity::TransactionLevel, DecoratorChain::new());
    assert_eq!(
        final_root(4, Granularity::TransactionLevel, DecoratorChain::new()),
        sequential
    );
    assert_eq!(
        final_root(4, Granularity::BlockLevel, DecoratorChain::new()),
        sequential
    );
    assert_eq!(
        final_root(
            1,
            Granularity::TransactionLevel,
            DecoratorChain::new().with(LoggingProxy)
        ),
        sequential
    );
}

#[test]
fn live_state_content_matches_simulated_world() {
    let provider = StochasticProvider::new(6, 3, 2);
    let mut world = provider.genesis();
    let mut items = Vec::new();
    provider
        .clone()
        .run(0, 2, &mut |item| {
            items.push(item);
            Ok(())
        })
        .unwrap();
    for item in &items {
        for (address, account) in &item.data.output_alloc {
            world.insert(*address, account.clone());
        }
    }

    let mut state = InMemoryStateDb::from_world_state(provider.genesis(), false);
    for item in &items {
        replay_processor::apply_transition(&mut state, &item.data).unwrap();
    }
    assert_eq!(state.world_state(), world);
    assert_eq!(state.get_balance(&StochasticProvider::coinbase()), U256::from(4) * U256::exp10(18));
}
