use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use replay_executor::{Consumer, Provider, ReplayError, WorkItem};
use replay_processor::RecordedTx;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One line of a transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLogEntry {
    pub block: u64,
    pub transaction: u32,
    #[serde(flatten)]
    pub tx: RecordedTx,
}

impl From<TxLogEntry> for WorkItem<RecordedTx> {
    fn from(entry: TxLogEntry) -> Self {
        WorkItem::new(entry.block, entry.transaction, entry.tx)
    }
}

/// Reads recorded transactions from a newline-delimited JSON file ordered by
/// block and transaction.
#[derive(Debug, Clone)]
pub struct TxLogProvider {
    path: PathBuf,
}

impl TxLogProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn source_error(&self, line: usize, err: impl std::fmt::Display) -> ReplayError {
        ReplayError::Source(format!("{}:{line}: {err}", self.path.display()))
    }
}

impl Provider<RecordedTx> for TxLogProvider {
    fn run(
        &mut self,
        from: u64,
        to: u64,
        consumer: &mut Consumer<'_, RecordedTx>,
    ) -> Result<(), ReplayError> {
        let file = File::open(&self.path).map_err(|err| self.source_error(0, err))?;
        let mut previous: Option<(u64, u32)> = None;
        let mut delivered = 0usize;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let number = index + 1;
            let line = line.map_err(|err| self.source_error(number, err))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TxLogEntry =
                serde_json::from_str(&line).map_err(|err| self.source_error(number, err))?;
            let position = (entry.block, entry.transaction);
            if previous.is_some_and(|previous| position <= previous) {
                return Err(self.source_error(
                    number,
                    format!(
                        "block {} transaction {} is out of order",
                        entry.block, entry.transaction
                    ),
                ));
            }
            previous = Some(position);

            if entry.block < from {
                continue;
            }
            if entry.block >= to {
                break;
            }
            consumer(entry.into())?;
            delivered += 1;
        }
        debug!(path = %self.path.display(), delivered, "Transaction log exhausted");
        Ok(())
    }
}

/// Appends entries to a transaction log.
pub struct TxLogWriter {
    writer: BufWriter<File>,
}

impl TxLogWriter {
    pub fn create(path: &Path) -> Result<Self, ReplayError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn append(&mut self, item: &WorkItem<RecordedTx>) -> Result<(), ReplayError> {
        let entry = TxLogEntry {
            block: item.block,
            transaction: item.transaction,
            tx: item.data.clone(),
        };
        serde_json::to_writer(&mut self.writer, &entry)
            .map_err(|err| ReplayError::Source(err.to_string()))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), ReplayError> {
        self.writer.flush()?;
        Ok(())
    }
}
