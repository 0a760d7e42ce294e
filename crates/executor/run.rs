use std::{
    collections::BTreeMap,
    panic,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Instant,
};

use crossbeam::channel::{Receiver, Sender, bounded};
use replay_state::{StateDb, StateError};
use tracing::{debug, info, warn};

use crate::{
    Context, Cursor, DecoratorChain, Extension, Granularity, Processor, Provider, ReplayError,
    WorkItem,
    extension::{backward, forward},
};

/// Parameters of a single run.
pub struct RunParams {
    /// First block to replay, inclusive.
    pub from: u64,
    /// Last block to replay, exclusive.
    pub to: u64,
    /// Values below 2 select the sequential mode.
    pub num_workers: usize,
    pub granularity: Granularity,
    pub state: Option<Box<dyn StateDb>>,
    pub decorators: DecoratorChain,
}

impl std::fmt::Debug for RunParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunParams")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("num_workers", &self.num_workers)
            .field("granularity", &self.granularity)
            .field("state", &self.state.is_some())
            .field("decorators", &self.decorators)
            .finish()
    }
}

impl RunParams {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from,
            to,
            num_workers: 1,
            granularity: Granularity::default(),
            state: None,
            decorators: DecoratorChain::default(),
        }
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_state(mut self, state: Box<dyn StateDb>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_decorators(mut self, decorators: DecoratorChain) -> Self {
        self.decorators = decorators;
        self
    }
}

/// Drives the items of a provider through a processor, notifying the
/// extensions around the run, each block and each transaction.
///
/// Hooks and `process` always run on the calling thread in provider order.
/// With more than one worker the provider is drained on its own thread and
/// the processor's warm-up stage runs on a worker pool ahead of the
/// committing thread.
pub struct Executor<T> {
    provider: Box<dyn Provider<T>>,
}

impl<T: Send> Executor<T> {
    pub fn new(provider: Box<dyn Provider<T>>) -> Self {
        Self { provider }
    }

    pub fn run(
        &mut self,
        params: RunParams,
        processor: &dyn Processor<T>,
        extensions: &mut [Box<dyn Extension<T>>],
    ) -> Result<(), ReplayError> {
        let RunParams {
            from,
            to,
            num_workers,
            granularity,
            state,
            decorators,
        } = params;
        info!(from, to, num_workers, %granularity, "Starting replay");
        let start = Instant::now();

        let mut ctx = Context::new(state);
        let mut position = (from, 0);
        let result = self.execute(
            from,
            to,
            num_workers,
            granularity,
            &decorators,
            processor,
            extensions,
            &mut ctx,
            &mut position,
        );

        // Failed runs may still hold the archive of the last opened block.
        let result = ReplayError::combine(result, release_archive(&mut ctx));
        ctx.unseal();

        let cursor = Cursor::at(position.0, position.1);
        let err = result.as_ref().err();
        let post_run = backward(extensions, |e| e.post_run(cursor, &mut ctx, err));

        match &result {
            Ok(()) => info!(elapsed = ?start.elapsed(), "Replay finished"),
            Err(err) => warn!(block = position.0, transaction = position.1, %err, "Replay failed"),
        }
        ReplayError::combine(result, post_run)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        from: u64,
        to: u64,
        num_workers: usize,
        granularity: Granularity,
        decorators: &DecoratorChain,
        processor: &dyn Processor<T>,
        extensions: &mut [Box<dyn Extension<T>>],
        ctx: &mut Context,
        position: &mut (u64, u32),
    ) -> Result<(), ReplayError> {
        forward(extensions, |e| e.pre_run(Cursor::at(from, 0), ctx))?;

        if !decorators.is_empty() {
            if ctx.has_state() {
                debug!(?decorators, "Decorating state-db");
                ctx.swap_state(|state| decorators.apply(state));
            } else {
                warn!(?decorators, "State decorators configured without a state-db");
            }
        }
        ctx.seal();

        let mut sequencer = Sequencer {
            ctx,
            extensions,
            processor,
            granularity,
            open_block: None,
            position: (from, 0),
            archive_disabled: false,
        };
        let provider = self.provider.as_mut();
        let result = if num_workers <= 1 {
            provider.run(from, to, &mut |item| sequencer.feed(item))
        } else {
            run_parallel(provider, from, to, num_workers, &mut sequencer)
        };
        let result = result.and_then(|()| sequencer.finish());

        *position = match result {
            Ok(()) => (to, 0),
            Err(_) => sequencer.position,
        };
        result
    }
}

fn release_archive(ctx: &mut Context) -> Result<(), ReplayError> {
    match ctx.take_archive() {
        Some(archive) => Ok(archive.release()?),
        None => Ok(()),
    }
}

/// Feeds work items, in order, through block boundary detection, the
/// extension hooks and the processor.
struct Sequencer<'a, T> {
    ctx: &'a mut Context,
    extensions: &'a mut [Box<dyn Extension<T>>],
    processor: &'a dyn Processor<T>,
    granularity: Granularity,
    open_block: Option<u64>,
    position: (u64, u32),
    archive_disabled: bool,
}

impl<T> Sequencer<'_, T> {
    fn feed(&mut self, item: WorkItem<T>) -> Result<(), ReplayError> {
        if self.open_block != Some(item.block) {
            // PostBlock sees the last item of the closing block.
            if self.open_block.is_some() {
                self.close_block()?;
            }
            self.position = (item.block, item.transaction);
            self.open_block(item.block)?;
        }
        self.position = (item.block, item.transaction);
        self.transaction(&item)
            .map_err(|err| err.at(item.block, item.transaction))
    }

    fn open_block(&mut self, block: u64) -> Result<(), ReplayError> {
        self.open_block = Some(block);
        if self.granularity == Granularity::TransactionLevel {
            self.acquire_archive(block)?;
        }
        let cursor = Cursor::at(block, self.position.1);
        forward(self.extensions, |e| e.pre_block(cursor, self.ctx))
    }

    /// Makes the state preceding `block` available to the processor.
    fn acquire_archive(&mut self, block: u64) -> Result<(), ReplayError> {
        let Some(parent) = block.checked_sub(1) else {
            return Ok(());
        };
        let Some(state) = self.ctx.state() else {
            return Ok(());
        };
        match state.get_archive_state(parent) {
            Ok(archive) => {
                self.ctx.set_archive(archive);
                Ok(())
            }
            Err(StateError::ArchiveDisabled) => {
                if !self.archive_disabled {
                    debug!("State-db has no archive, processing against the live state");
                    self.archive_disabled = true;
                }
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn transaction(&mut self, item: &WorkItem<T>) -> Result<(), ReplayError> {
        let cursor = item.cursor();
        forward(self.extensions, |e| e.pre_transaction(cursor, self.ctx))?;
        self.processor.process(item, self.ctx)?;
        backward(self.extensions, |e| e.post_transaction(cursor, self.ctx))
    }

    fn close_block(&mut self) -> Result<(), ReplayError> {
        let cursor = Cursor::at(self.position.0, self.position.1);
        let hooks = backward(self.extensions, |e| e.post_block(cursor, self.ctx));
        let release = release_archive(self.ctx);
        self.open_block = None;
        ReplayError::combine(hooks, release)
    }

    fn finish(&mut self) -> Result<(), ReplayError> {
        match self.open_block {
            Some(_) => self.close_block(),
            None => Ok(()),
        }
    }
}

/// Work dispatched to the warm-up pool.
enum Unit<T> {
    Item(WorkItem<T>),
    Block(Vec<WorkItem<T>>),
}

impl<T> Unit<T> {
    fn warm(&self, processor: &dyn Processor<T>) -> Result<(), ReplayError> {
        match self {
            Unit::Item(item) => processor
                .warm(item)
                .map_err(|err| err.at(item.block, item.transaction)),
            Unit::Block(items) => items.iter().try_for_each(|item| {
                processor
                    .warm(item)
                    .map_err(|err| err.at(item.block, item.transaction))
            }),
        }
    }
}

/// Groups provider output into sequence-numbered units.
struct Batcher<T> {
    granularity: Granularity,
    sender: Sender<(u64, Unit<T>)>,
    next: u64,
    block: Vec<WorkItem<T>>,
}

impl<T> Batcher<T> {
    fn push(&mut self, item: WorkItem<T>) -> Result<(), ReplayError> {
        if self.granularity == Granularity::TransactionLevel {
            return self.send(Unit::Item(item));
        }
        let boundary = self
            .block
            .first()
            .is_some_and(|first| first.block != item.block);
        if boundary {
            let block = std::mem::take(&mut self.block);
            self.send(Unit::Block(block))?;
        }
        self.block.push(item);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReplayError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let block = std::mem::take(&mut self.block);
        self.send(Unit::Block(block))
    }

    fn send(&mut self, unit: Unit<T>) -> Result<(), ReplayError> {
        self.sender
            .send((self.next, unit))
            .map_err(|_| ReplayError::Aborted)?;
        self.next += 1;
        Ok(())
    }
}

type Warmed<T> = (u64, Result<Unit<T>, ReplayError>);

/// Provider thread -> warm-up workers -> reorder buffer -> sequencer.
fn run_parallel<T: Send>(
    provider: &mut dyn Provider<T>,
    from: u64,
    to: u64,
    num_workers: usize,
    sequencer: &mut Sequencer<'_, T>,
) -> Result<(), ReplayError> {
    let capacity = num_workers * 10;
    let processor = sequencer.processor;
    let granularity = sequencer.granularity;
    let abort = AtomicBool::new(false);
    let abort = &abort;

    thread::scope(|s| -> Result<(), ReplayError> {
        let (unit_tx, unit_rx) = bounded::<(u64, Unit<T>)>(capacity);
        let (ready_tx, ready_rx) = bounded::<Warmed<T>>(capacity);

        let feeder = thread::Builder::new()
            .name("replay-provider".to_string())
            .spawn_scoped(s, move || {
                let mut batcher = Batcher {
                    granularity,
                    sender: unit_tx,
                    next: 0,
                    block: Vec::new(),
                };
                provider
                    .run(from, to, &mut |item| {
                        if abort.load(Ordering::Relaxed) {
                            return Err(ReplayError::Aborted);
                        }
                        batcher.push(item)
                    })
                    .and_then(|()| batcher.flush())
            })?;

        let mut workers = Vec::with_capacity(num_workers);
        let mut spawn_error = None;
        for id in 0..num_workers {
            let units = unit_rx.clone();
            let ready = ready_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("replay-worker-{id}"))
                .spawn_scoped(s, move || {
                    for (index, unit) in units.iter() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let warmed = unit.warm(processor).map(|()| unit);
                        if ready.send((index, warmed)).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    abort.store(true, Ordering::Relaxed);
                    spawn_error = Some(err);
                    break;
                }
            }
        }
        drop(unit_rx);
        drop(ready_tx);

        let committed = match spawn_error {
            Some(err) => {
                drop(ready_rx);
                Err(err.into())
            }
            None => commit(ready_rx, sequencer),
        };
        if committed.is_err() {
            abort.store(true, Ordering::Relaxed);
        }

        for worker in workers {
            if let Err(payload) = worker.join() {
                panic::resume_unwind(payload);
            }
        }
        let fed = match feeder.join() {
            Ok(fed) => fed,
            Err(payload) => panic::resume_unwind(payload),
        };
        committed.and(fed)
    })
}

/// Restores provider order and feeds the sequencer. Returns at the first
/// error, dropping the receiver so that workers stop.
fn commit<T>(
    ready: Receiver<Warmed<T>>,
    sequencer: &mut Sequencer<'_, T>,
) -> Result<(), ReplayError> {
    let mut pending = BTreeMap::new();
    let mut next = 0u64;
    for (index, warmed) in ready.iter() {
        pending.insert(index, warmed);
        while let Some(warmed) = pending.remove(&next) {
            next += 1;
            match warmed? {
                Unit::Item(item) => sequencer.feed(item)?,
                Unit::Block(items) => {
                    for item in items {
                        sequencer.feed(item)?;
                    }
                }
            }
        }
    }
    Ok(())
}
