use std::path::PathBuf;

use clap::{ArgAction, Parser as ClapParser, Subcommand as ClapSubcommand};
use replay_config::{Config, ConfigError};
use replay_executor::Granularity;
use tracing::Level;

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(name = "replay", author, version = VERSION_STRING, about = "Replays blockchain workloads against a state-db", long_about = None)]
pub struct CLI {
    #[clap(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Subcommand,
}

/// Command line overrides. Every option left unset keeps the value of the
/// configuration file, or its default when no file is given.
#[derive(ClapParser, Debug, Default)]
pub struct Options {
    #[arg(long = "config", value_name = "CONFIG_FILE", env = "REPLAY_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long = "log.level", value_name = "LOG_LEVEL")]
    pub log_level: Option<Level>,
    #[arg(long = "trace-state", action = ArgAction::SetTrue, help = "Trace every state-db call at debug level.")]
    pub trace_state: bool,
    #[arg(long = "first", value_name = "BLOCK", help_heading = "Range options")]
    pub first: Option<u64>,
    #[arg(long = "last", value_name = "BLOCK", help_heading = "Range options")]
    pub last: Option<u64>,
    #[arg(long = "workers", value_name = "NUM", help_heading = "Execution options")]
    pub workers: Option<usize>,
    #[arg(
        long = "granularity",
        value_name = "GRANULARITY",
        help = "Unit of execution, `transaction` or `block`.",
        help_heading = "Execution options"
    )]
    pub granularity: Option<Granularity>,
    #[arg(long = "archive-query", action = ArgAction::SetTrue, help = "Execute transactions against the archive of the parent block.", help_heading = "Execution options")]
    pub archive_query: bool,
    #[arg(long = "continue-on-failure", action = ArgAction::SetTrue, help_heading = "Failure options")]
    pub continue_on_failure: bool,
    #[arg(
        long = "max-num-errors",
        value_name = "NUM",
        help = "Failures tolerated with --continue-on-failure, 0 for unlimited.",
        help_heading = "Failure options"
    )]
    pub max_num_errors: Option<usize>,
    #[arg(long = "error-log", value_name = "FILE", help_heading = "Failure options")]
    pub error_log: Option<PathBuf>,
    #[arg(long = "validate-tx", action = ArgAction::SetTrue, help_heading = "Validation options")]
    pub validate_tx_state: bool,
    #[arg(long = "validate-state-hash", action = ArgAction::SetTrue, help_heading = "Validation options")]
    pub validate_state_hash: bool,
    #[arg(long = "state-hashes", value_name = "FILE", help_heading = "Validation options")]
    pub state_hashes: Option<PathBuf>,
    #[arg(long = "db-impl", value_name = "IMPL", help_heading = "State-db options")]
    pub db_impl: Option<String>,
    #[arg(long = "archive", action = ArgAction::SetTrue, help_heading = "State-db options")]
    pub archive_mode: bool,
    #[arg(long = "keep-db", action = ArgAction::SetTrue, help_heading = "State-db options")]
    pub keep_db: bool,
    #[arg(long = "db-tmp", value_name = "DIR", help_heading = "State-db options")]
    pub db_tmp: Option<PathBuf>,
    #[arg(long = "db-src", value_name = "DIR", help_heading = "State-db options")]
    pub state_db_src: Option<PathBuf>,
    #[arg(long = "prime-alloc", value_name = "FILE", help_heading = "State-db options")]
    pub prime_alloc: Option<PathBuf>,
    #[arg(long = "profile-blocks", value_name = "FILE", help_heading = "Reporting options")]
    pub profile_blocks_path: Option<PathBuf>,
    #[arg(long = "memory-breakdown", action = ArgAction::SetTrue, help_heading = "Reporting options")]
    pub memory_breakdown: bool,
    #[arg(long = "memory-breakdown-per-block", action = ArgAction::SetTrue, help_heading = "Reporting options")]
    pub memory_breakdown_per_block: bool,
    #[arg(long = "progress-interval", value_name = "SECONDS", help_heading = "Reporting options")]
    pub progress_report_secs: Option<u64>,
    #[arg(long = "no-heartbeat-logging", action = ArgAction::SetTrue, help_heading = "Reporting options")]
    pub no_heartbeat_logging: bool,
}

#[derive(ClapSubcommand, Debug)]
pub enum Subcommand {
    #[command(about = "Replay a recorded transaction log.")]
    Substate {
        #[arg(long = "log", value_name = "TX_LOG", help = "JSON lines transaction log, defaults to `tx_log` of the configuration file.")]
        log: Option<PathBuf>,
    },
    #[command(about = "Replay a synthetic transfer workload.")]
    Stochastic {
        #[arg(long = "seed", value_name = "SEED")]
        seed: Option<u64>,
        #[arg(long = "accounts", value_name = "NUM")]
        accounts: Option<usize>,
        #[arg(long = "txs-per-block", value_name = "NUM")]
        txs_per_block: Option<usize>,
    },
}

impl Options {
    /// Loads the configuration file, if any, and applies the command line
    /// overrides on top. The result is not validated yet.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(level) = self.log_level {
            cfg.log_level = level.as_str().to_lowercase();
        }
        cfg.first = self.first.unwrap_or(cfg.first);
        cfg.last = self.last.unwrap_or(cfg.last);
        cfg.workers = self.workers.unwrap_or(cfg.workers);
        cfg.granularity = self.granularity.unwrap_or(cfg.granularity);
        cfg.max_num_errors = self.max_num_errors.unwrap_or(cfg.max_num_errors);
        cfg.progress_report_secs = self.progress_report_secs.unwrap_or(cfg.progress_report_secs);
        if let Some(db_impl) = self.db_impl {
            cfg.db_impl = db_impl;
        }
        if let Some(db_tmp) = self.db_tmp {
            cfg.db_tmp = db_tmp;
        }

        cfg.trace_state |= self.trace_state;
        cfg.archive_query |= self.archive_query;
        cfg.continue_on_failure |= self.continue_on_failure;
        cfg.validate_tx_state |= self.validate_tx_state;
        cfg.validate_state_hash |= self.validate_state_hash;
        cfg.archive_mode |= self.archive_mode;
        cfg.keep_db |= self.keep_db;
        cfg.memory_breakdown |= self.memory_breakdown;
        cfg.memory_breakdown_per_block |= self.memory_breakdown_per_block;
        cfg.no_heartbeat_logging |= self.no_heartbeat_logging;

        cfg.error_log = self.error_log.or(cfg.error_log);
        cfg.state_hashes = self.state_hashes.or(cfg.state_hashes);
        cfg.state_db_src = self.state_db_src.or(cfg.state_db_src);
        cfg.prime_alloc = self.prime_alloc.or(cfg.prime_alloc);
        cfg.profile_blocks_path = self.profile_blocks_path.or(cfg.profile_blocks_path);

        Ok(cfg)
    }
}
