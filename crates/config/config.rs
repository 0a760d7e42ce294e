//! Flat options record shared by every replay command.

use std::path::{Path, PathBuf};

use replay_executor::Granularity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_DB_IMPL: &str = "memory";
pub const SUPPORTED_DB_IMPLS: &[&str] = &[DEFAULT_DB_IMPL];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("first block {first} is greater than last block {last}")]
    InvalidRange { first: u64, last: u64 },
    #[error("{0} requires archive mode")]
    ArchiveRequired(&'static str),
    #[error("unknown state-db implementation: {0}")]
    UnknownDbImpl(String),
    #[error("{0} must be set")]
    MissingOption(&'static str),
    #[error("path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of the synthetic workload generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticConfig {
    pub seed: u64,
    pub accounts: usize,
    pub txs_per_block: usize,
}

impl Default for StochasticConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            accounts: 1_000,
            txs_per_block: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// First block to replay.
    pub first: u64,
    /// Last block to replay, inclusive.
    pub last: u64,
    pub workers: usize,
    pub granularity: Granularity,
    pub continue_on_failure: bool,
    /// Zero means unlimited.
    pub max_num_errors: usize,
    pub validate_tx_state: bool,
    pub validate_state_hash: bool,
    pub db_impl: String,
    pub archive_mode: bool,
    /// Execute transactions against the archive instead of the live state.
    pub archive_query: bool,
    pub keep_db: bool,
    /// Parent directory of temporary state-dbs.
    pub db_tmp: PathBuf,
    /// Existing state-db to start from.
    pub state_db_src: Option<PathBuf>,
    pub log_level: String,
    /// Trace every state-db call.
    pub trace_state: bool,
    pub error_log: Option<PathBuf>,
    pub profile_blocks_path: Option<PathBuf>,
    pub memory_breakdown: bool,
    /// Also report memory usage after every block.
    pub memory_breakdown_per_block: bool,
    pub progress_report_secs: u64,
    pub no_heartbeat_logging: bool,
    /// World state loaded into the state-db at block `first - 1`.
    pub prime_alloc: Option<PathBuf>,
    /// Expected state hashes by block.
    pub state_hashes: Option<PathBuf>,
    pub tx_log: Option<PathBuf>,
    pub stochastic: StochasticConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first: 0,
            last: 0,
            workers: 1,
            granularity: Granularity::default(),
            continue_on_failure: false,
            max_num_errors: 50,
            validate_tx_state: false,
            validate_state_hash: false,
            db_impl: DEFAULT_DB_IMPL.to_string(),
            archive_mode: false,
            archive_query: false,
            keep_db: false,
            db_tmp: std::env::temp_dir(),
            state_db_src: None,
            log_level: "info".to_string(),
            trace_state: false,
            error_log: None,
            profile_blocks_path: None,
            memory_breakdown: false,
            memory_breakdown_per_block: false,
            progress_report_secs: 15,
            no_heartbeat_logging: false,
            prime_alloc: None,
            state_hashes: None,
            tx_log: None,
            stochastic: StochasticConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Exclusive upper bound of the replayed range.
    pub fn to_block(&self) -> u64 {
        self.last.saturating_add(1)
    }

    /// Checks the record for inconsistent options, normalising the ones with
    /// an obvious fallback.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.first > self.last {
            return Err(ConfigError::InvalidRange {
                first: self.first,
                last: self.last,
            });
        }
        if self.workers == 0 {
            warn!("Worker count must be positive, using a single worker");
            self.workers = 1;
        }
        if !SUPPORTED_DB_IMPLS.contains(&self.db_impl.as_str()) {
            return Err(ConfigError::UnknownDbImpl(self.db_impl));
        }
        if self.archive_query && !self.archive_mode {
            return Err(ConfigError::ArchiveRequired("archive query"));
        }
        if self.archive_query && self.granularity == Granularity::BlockLevel {
            return Err(ConfigError::ArchiveRequired(
                "archive query at block granularity",
            ));
        }
        if self.validate_state_hash && self.state_hashes.is_none() {
            return Err(ConfigError::MissingOption("state_hashes"));
        }
        for path in [&self.state_db_src, &self.prime_alloc, &self.state_hashes, &self.tx_log]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                return Err(ConfigError::MissingPath(path.clone()));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"first": 5, "last": 9, "granularity": "block", "stochastic": {{"seed": 3}}}}"#
        )
        .unwrap();

        let cfg = Config::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.first, 5);
        assert_eq!(cfg.to_block(), 10);
        assert_eq!(cfg.granularity, Granularity::BlockLevel);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.stochastic.seed, 3);
        assert_eq!(cfg.stochastic.accounts, 1_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"frist": 5}}"#).unwrap();
        assert!(matches!(
            Config::from_json_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let cfg = Config {
            first: 10,
            last: 9,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidRange { first: 10, last: 9 })
        ));
    }

    #[test]
    fn validate_normalises_worker_count() {
        let cfg = Config {
            workers: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate().unwrap().workers, 1);
    }

    #[test]
    fn archive_query_needs_archive_mode() {
        let cfg = Config {
            archive_query: true,
            ..Default::default()
        };
        assert!(matches!(
            cfg.clone().validate(),
            Err(ConfigError::ArchiveRequired(_))
        ));
        let cfg = Config {
            archive_mode: true,
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_checks_input_paths() {
        let cfg = Config {
            prime_alloc: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingPath(_))));

        let cfg = Config {
            db_impl: "carmen".to_string(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownDbImpl(_))));

        let cfg = Config {
            validate_state_hash: true,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingOption("state_hashes"))
        ));
    }
}
