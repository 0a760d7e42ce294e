use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use ethereum_types::H256;
use replay_config::Config;
use replay_executor::{Context, Cursor, Extension, ReplayError};
use replay_state::{InMemoryStateDb, StateDb, StateError, WORLD_STATE_FILE};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info};

/// Metadata written next to a kept state-db.
pub const STATE_DB_INFO_FILE: &str = "statedb_info.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDbInfo {
    pub db_impl: String,
    pub archive_mode: bool,
    /// Last block whose effects are contained in the state-db.
    pub block: u64,
    pub root_hash: H256,
}

impl StateDbInfo {
    pub fn read(directory: &Path) -> Result<Self, ReplayError> {
        let file = File::open(directory.join(STATE_DB_INFO_FILE))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| ReplayError::Setup(format!("invalid state-db info: {err}")))
    }

    pub fn write(&self, directory: &Path) -> Result<(), ReplayError> {
        let mut writer = BufWriter::new(File::create(directory.join(STATE_DB_INFO_FILE))?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| ReplayError::Setup(format!("cannot encode state-db info: {err}")))?;
        writer.flush()?;
        Ok(())
    }
}

/// Opens the state-db implementation named `db_impl` in `directory`.
pub fn open_state_db(
    db_impl: &str,
    archive_mode: bool,
    directory: &Path,
) -> Result<Box<dyn StateDb>, ReplayError> {
    match db_impl {
        "memory" => Ok(Box::new(InMemoryStateDb::open(directory, archive_mode)?)),
        other => Err(StateError::UnsupportedImpl(other.to_string()).into()),
    }
}

/// Owns the working state-db of a run.
///
/// When the caller did not provide a state-db, one is created in a fresh
/// directory under `db_tmp` at PreRun, optionally seeded from `state_db_src`.
/// At PostRun the state-db is closed and its directory either deleted or,
/// with `keep_db`, kept together with a [`StateDbInfo`] record.
pub struct StateDbManager {
    db_impl: String,
    archive_mode: bool,
    keep_db: bool,
    db_tmp: PathBuf,
    state_db_src: Option<PathBuf>,
    directory: Option<TempDir>,
}

impl StateDbManager {
    pub fn new(cfg: &Config) -> Self {
        Self {
            db_impl: cfg.db_impl.clone(),
            archive_mode: cfg.archive_mode,
            keep_db: cfg.keep_db,
            db_tmp: cfg.db_tmp.clone(),
            state_db_src: cfg.state_db_src.clone(),
            directory: None,
        }
    }

    fn seed_from_source(&self, source: &Path, first: u64, directory: &Path) -> Result<(), ReplayError> {
        let info = StateDbInfo::read(source)?;
        if info.db_impl != self.db_impl {
            return Err(ReplayError::Setup(format!(
                "source state-db uses {} but {} is configured",
                info.db_impl, self.db_impl
            )));
        }
        if info.block >= first {
            return Err(ReplayError::Setup(format!(
                "source state-db already contains block {}, cannot replay from block {first}",
                info.block
            )));
        }
        let content = source.join(WORLD_STATE_FILE);
        if content.exists() {
            std::fs::copy(&content, directory.join(WORLD_STATE_FILE))?;
        }
        debug!(source = %source.display(), block = info.block, "Seeded state-db from source");
        Ok(())
    }
}

impl<T> Extension<T> for StateDbManager {
    fn pre_run(&mut self, cursor: Cursor<'_, T>, ctx: &mut Context) -> Result<(), ReplayError> {
        if ctx.has_state() {
            info!("Using the state-db provided by the caller");
            return Ok(());
        }
        std::fs::create_dir_all(&self.db_tmp)?;
        let directory = tempfile::Builder::new()
            .prefix("state_db_tmp_")
            .tempdir_in(&self.db_tmp)?;
        if let Some(source) = &self.state_db_src {
            self.seed_from_source(source, cursor.block, directory.path())?;
        }

        let state = open_state_db(&self.db_impl, self.archive_mode, directory.path())?;
        info!(
            db_impl = %self.db_impl,
            archive_mode = self.archive_mode,
            directory = %directory.path().display(),
            "Created state-db"
        );
        ctx.install_state(state)?;
        ctx.state_db_path = Some(directory.path().to_path_buf());
        self.directory = Some(directory);
        Ok(())
    }

    fn post_run(
        &mut self,
        cursor: Cursor<'_, T>,
        ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        // A state-db provided by the caller is left to the caller.
        let Some(directory) = self.directory.take() else {
            return Ok(());
        };
        ctx.state_db_path = None;

        if !self.keep_db {
            if let Some(mut state) = ctx.take_state()? {
                state.close()?;
            }
            directory.close()?;
            info!("Temporary state-db removed");
            return Ok(());
        }

        // Kept before anything can fail so the directory survives errors.
        let path = directory.keep();
        let Some(mut state) = ctx.take_state()? else {
            return Ok(());
        };
        let root_hash = state.state_hash();
        let closed = state.close();
        let info = StateDbInfo {
            db_impl: self.db_impl.clone(),
            archive_mode: self.archive_mode,
            block: cursor.block.saturating_sub(1),
            root_hash: root_hash?,
        };
        closed?;
        info.write(&path)?;
        info!(directory = %path.display(), block = info.block, "State-db kept");
        Ok(())
    }
}
