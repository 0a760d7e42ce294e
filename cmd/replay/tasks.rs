//! Wires providers, processor and extensions into replay runs.

use std::{path::Path, time::Duration};

use eyre::eyre;
use replay_config::{Config, StochasticConfig};
use replay_executor::{DecoratorChain, Executor, ExtensionList, FailureBudget, Provider, RunParams};
use replay_extensions::{
    BlockEventEmitter, BlockRuntimeAndGasCollector, ErrorLogger, LoggingProxy,
    MemoryUsagePrinter, ProgressLogger, StateDbManager, StateDbPrimer, StateHashValidator,
    TransactionEventEmitter, TxValidator,
};
use replay_processor::{RecordedTx, TxProcessor, TxTarget};
use replay_providers::{StochasticProvider, TxLogProvider};
use replay_state::WorldState;
use tracing::{info, warn};

/// Replays a recorded transaction log, taken from `log` or the `tx_log`
/// option.
pub fn run_substate(cfg: &Config, log: Option<&Path>) -> eyre::Result<()> {
    let log = log
        .or(cfg.tx_log.as_deref())
        .ok_or_else(|| eyre!("no transaction log given, use --log or set tx_log"))?;
    info!(
        log = %log.display(),
        first = cfg.first,
        last = cfg.last,
        workers = cfg.workers,
        granularity = %cfg.granularity,
        "Replaying transaction log"
    );

    let extensions = build_extensions(cfg, None)?;
    replay(cfg, Box::new(TxLogProvider::new(log)), extensions)
}

/// Replays a synthetic transfer workload. Generation is sequential, so the
/// run always uses a single worker.
pub fn run_stochastic(cfg: &Config, stochastic: &StochasticConfig) -> eyre::Result<()> {
    let mut cfg = cfg.clone();
    if cfg.workers > 1 {
        warn!(
            workers = cfg.workers,
            "Synthetic workloads are replayed by a single worker"
        );
        cfg.workers = 1;
    }
    info!(
        seed = stochastic.seed,
        accounts = stochastic.accounts,
        txs_per_block = stochastic.txs_per_block,
        first = cfg.first,
        last = cfg.last,
        "Replaying synthetic workload"
    );

    let provider = StochasticProvider::new(
        stochastic.seed,
        stochastic.accounts,
        stochastic.txs_per_block,
    );
    // A seeded state-db already contains the generated accounts.
    let genesis = (cfg.prime_alloc.is_none() && cfg.state_db_src.is_none())
        .then(|| provider.genesis());

    let extensions = build_extensions(&cfg, genesis)?;
    replay(&cfg, Box::new(provider), extensions)
}

fn failure_budget(cfg: &Config) -> FailureBudget {
    FailureBudget::new(cfg.continue_on_failure, cfg.max_num_errors)
}

fn target(cfg: &Config) -> TxTarget {
    if cfg.archive_query {
        TxTarget::Archive
    } else {
        TxTarget::Live
    }
}

fn build_extensions(
    cfg: &Config,
    genesis: Option<WorldState>,
) -> eyre::Result<ExtensionList<RecordedTx>> {
    let mut extensions: ExtensionList<RecordedTx> = Vec::new();

    if !cfg.no_heartbeat_logging && cfg.progress_report_secs > 0 {
        extensions.push(Box::new(ProgressLogger::new(
            Duration::from_secs(cfg.progress_report_secs),
            cfg.workers,
        )));
    }
    extensions.push(Box::new(ErrorLogger::new(cfg.workers, cfg.error_log.clone())));
    extensions.push(Box::new(StateDbManager::new(cfg)));

    if let Some(path) = &cfg.prime_alloc {
        extensions.push(Box::new(StateDbPrimer::from_file(path)?));
    } else if let Some(genesis) = genesis {
        extensions.push(Box::new(StateDbPrimer::new(genesis)));
    }
    if cfg.memory_breakdown || cfg.memory_breakdown_per_block {
        extensions.push(Box::new(MemoryUsagePrinter::new(
            cfg.memory_breakdown_per_block,
        )));
    }
    if cfg.validate_state_hash {
        let path = cfg
            .state_hashes
            .as_deref()
            .ok_or_else(|| eyre!("state hash validation needs state_hashes"))?;
        extensions.push(Box::new(StateHashValidator::from_file(
            path,
            failure_budget(cfg),
        )?));
    }

    extensions.push(Box::new(BlockEventEmitter));
    extensions.push(Box::new(TransactionEventEmitter));

    if cfg.validate_tx_state {
        extensions.push(Box::new(TxValidator::new(target(cfg), failure_budget(cfg))));
    }
    if let Some(path) = &cfg.profile_blocks_path {
        extensions.push(Box::new(BlockRuntimeAndGasCollector::new(path.clone())));
    }

    Ok(extensions)
}

fn replay(
    cfg: &Config,
    provider: Box<dyn Provider<RecordedTx>>,
    mut extensions: ExtensionList<RecordedTx>,
) -> eyre::Result<()> {
    let processor = TxProcessor::new(target(cfg), failure_budget(cfg));

    let mut params = RunParams::new(cfg.first, cfg.to_block())
        .with_workers(cfg.workers)
        .with_granularity(cfg.granularity);
    if cfg.trace_state {
        params = params.with_decorators(DecoratorChain::new().with(LoggingProxy));
    }

    Executor::new(provider).run(params, &processor, &mut extensions)?;
    Ok(())
}
