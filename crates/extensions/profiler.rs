use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

use replay_executor::{Context, Cursor, Extension, ReplayError};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProfile {
    pub block: u64,
    pub txs: u64,
    pub gas: u64,
    pub runtime: Duration,
}

/// Measures the runtime, transaction count and gas of every block and writes
/// them as CSV.
///
/// Must be the last extension of the list so that its timer encloses as
/// little extension overhead as possible.
pub struct BlockRuntimeAndGasCollector {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    started: Option<Instant>,
    txs: u64,
    gas: u64,
    runtimes: Vec<Duration>,
}

impl BlockRuntimeAndGasCollector {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            started: None,
            txs: 0,
            gas: 0,
            runtimes: Vec::new(),
        }
    }

    fn write(&mut self, profile: &BlockProfile) -> Result<(), ReplayError> {
        if let Some(writer) = self.writer.as_mut() {
            writeln!(
                writer,
                "{},{},{},{}",
                profile.block,
                profile.txs,
                profile.gas,
                profile.runtime.as_micros()
            )?;
        }
        Ok(())
    }

    fn log_statistics(&mut self) {
        let n = self.runtimes.len();
        if n == 0 {
            return;
        }
        self.runtimes.sort();
        let total: Duration = self.runtimes.iter().sum();
        info!(
            blocks = n,
            avg = ?total / n as u32,
            median = ?self.runtimes[n / 2],
            p95 = ?self.runtimes[((n - 1) as f64 * 0.95) as usize],
            max = ?self.runtimes[n - 1],
            "Block runtime statistics"
        );
    }
}

impl<T> Extension<T> for BlockRuntimeAndGasCollector {
    fn pre_run(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        let file = File::create(&self.path).map_err(|err| {
            ReplayError::Setup(format!(
                "cannot create block profile {}: {err}",
                self.path.display()
            ))
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "block,txs,gas,runtime_us")?;
        self.writer = Some(writer);
        Ok(())
    }

    fn pre_block(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        (self.txs, self.gas) = (0, 0);
        self.started = Some(Instant::now());
        Ok(())
    }

    fn post_transaction(
        &mut self,
        _cursor: Cursor<'_, T>,
        ctx: &mut Context,
    ) -> Result<(), ReplayError> {
        self.txs += 1;
        self.gas += ctx.execution_result.map(|r| r.gas_used).unwrap_or_default();
        Ok(())
    }

    fn post_block(&mut self, cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        let runtime = self
            .started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.runtimes.push(runtime);
        let profile = BlockProfile {
            block: cursor.block,
            txs: self.txs,
            gas: self.gas,
            runtime,
        };
        self.write(&profile)
    }

    fn post_run(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            info!(path = %self.path.display(), "Block profile written");
        }
        self.log_statistics();
        Ok(())
    }
}
