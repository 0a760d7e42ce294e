use std::{
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, bounded, select, tick};
use replay_executor::{Context, Cursor, Extension, ReplayError};
use tracing::{info, warn};

struct BlockReport {
    block: u64,
    txs: u64,
    gas: u64,
}

/// Totals of a run as seen by the [`ProgressLogger`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSummary {
    pub last_block: Option<u64>,
    pub blocks: u64,
    pub txs: u64,
    pub gas: u64,
    pub elapsed: Duration,
}

impl ProgressSummary {
    pub fn txs_per_second(&self) -> f64 {
        rate(self.txs, self.elapsed)
    }

    pub fn mgas_per_second(&self) -> f64 {
        rate(self.gas, self.elapsed) / 1e6
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Heartbeat reporting the replay throughput at a fixed interval from a
/// background thread, plus a summary at the end of the run.
pub struct ProgressLogger {
    interval: Duration,
    capacity: usize,
    sender: Option<Sender<BlockReport>>,
    handle: Option<JoinHandle<ProgressSummary>>,
    txs: u64,
    gas: u64,
    summary: Option<ProgressSummary>,
}

impl ProgressLogger {
    pub fn new(interval: Duration, workers: usize) -> Self {
        Self {
            interval,
            capacity: workers.max(1) * 10,
            sender: None,
            handle: None,
            txs: 0,
            gas: 0,
            summary: None,
        }
    }

    /// Final totals, available once the run has ended.
    pub fn summary(&self) -> Option<ProgressSummary> {
        self.summary
    }
}

fn report_progress(reports: Receiver<BlockReport>, interval: Duration) -> ProgressSummary {
    let start = Instant::now();
    let ticker = tick(interval);
    let mut summary = ProgressSummary::default();
    let (mut txs, mut gas) = (0u64, 0u64);
    let mut last_tick = start;

    loop {
        select! {
            recv(reports) -> report => match report {
                Ok(report) => {
                    summary.last_block = Some(report.block);
                    summary.blocks += 1;
                    summary.txs += report.txs;
                    summary.gas += report.gas;
                    txs += report.txs;
                    gas += report.gas;
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                let window = last_tick.elapsed();
                info!(
                    elapsed = ?start.elapsed(),
                    block = ?summary.last_block,
                    "Reached block, ~{:.1} Tx/s, ~{:.2} MGas/s",
                    rate(txs, window),
                    rate(gas, window) / 1e6,
                );
                (txs, gas) = (0, 0);
                last_tick = Instant::now();
            }
        }
    }
    summary.elapsed = start.elapsed();
    summary
}

impl<T> Extension<T> for ProgressLogger {
    fn pre_run(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        let (sender, receiver) = bounded(self.capacity);
        let interval = self.interval;
        let handle = std::thread::Builder::new()
            .name("progress-logger".to_string())
            .spawn(move || report_progress(receiver, interval))?;
        self.sender = Some(sender);
        self.handle = Some(handle);
        Ok(())
    }

    fn pre_block(&mut self, _cursor: Cursor<'_, T>, _ctx: &mut Context) -> Result<(), ReplayError> {
        (self.txs, self.gas) = (0, 0);
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
        if let Some(sender) = &self.sender {
            let report = BlockReport {
                block: cursor.block,
                txs: self.txs,
                gas: self.gas,
            };
            if sender.send(report).is_err() {
                warn!("Progress reporter is gone");
            }
        }
        Ok(())
    }

    fn post_run(
        &mut self,
        _cursor: Cursor<'_, T>,
        _ctx: &mut Context,
        _err: Option<&ReplayError>,
    ) -> Result<(), ReplayError> {
        self.sender = None;
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let summary = handle
            .join()
            .map_err(|_| ReplayError::Setup("progress logger thread panicked".to_string()))?;
        info!(
            elapsed = ?summary.elapsed,
            blocks = summary.blocks,
            txs = summary.txs,
            gas = summary.gas,
            "Total elapsed time, ~{:.1} Tx/s, ~{:.2} MGas/s",
            summary.txs_per_second(),
            summary.mgas_per_second(),
        );
        self.summary = Some(summary);
        Ok(())
    }
}
