// src/resize/pool.rs
//
// Worker-pool scheduler for resize batches.
//
// Every tick does three things under one short critical section:
//   1. reap:  ask processes running longer than PROCESS_TIMEOUT to stop
//   2. gate:  nothing pending, or N processes running -> done
//   3. drain: fold pending jobs FIFO into batches of up to L targets and
//             launch them while capacity remains; jobs whose source is owned
//             by a running batch go back to the tail of the queue
//
// Processes run on spawned tasks. Exit handling never holds the state lock
// across an await or while observers are notified.

use super::builder::{ProcessBuilder, ResizeCommand};
use super::common::{ResizeOutcome, ResizeService, ResizeServiceObserver, Variation};
use super::process::{ProcessExit, ProcessRunner};
use crate::files::FileFinder;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Wall time a batch process may run before it is asked to terminate.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(4);

/// Default number of concurrently running batch processes.
pub const DEFAULT_CONCURRENCY: usize = 3;

struct ResizeJob {
    source: PathBuf,
    variations: Vec<Variation>,
    observer: Arc<dyn ResizeServiceObserver>,
}

struct ActiveBatch {
    started_at: Instant,
    terminate: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct PoolState {
    pending: VecDeque<ResizeJob>,
    active: HashMap<u64, ActiveBatch>,
    locked_sources: HashSet<PathBuf>,
    next_batch: u64,
}

struct BatchEntry {
    source: PathBuf,
    target: PathBuf,
    observer: Arc<dyn ResizeServiceObserver>,
}

/// A batch being accumulated during one drain pass.
struct Batch {
    builder: ProcessBuilder,
    entries: Vec<BatchEntry>,
}

impl Batch {
    fn new(template: &ProcessBuilder) -> Self {
        Self {
            builder: template.clone(),
            entries: Vec::new(),
        }
    }

    fn fold(&mut self, job: ResizeJob) {
        for variation in job.variations {
            self.builder
                .push_resize(&job.source, &variation.target, variation.width, variation.height);
            self.entries.push(BatchEntry {
                source: job.source.clone(),
                target: variation.target,
                observer: Arc::clone(&job.observer),
            });
        }
    }
}

/// A registered batch ready to be started outside the lock.
struct Launch {
    id: u64,
    command: ResizeCommand,
    sources: Vec<PathBuf>,
    entries: Vec<BatchEntry>,
    terminate: oneshot::Receiver<()>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    template: ProcessBuilder,
    concurrency: usize,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
    finder: Arc<dyn FileFinder>,
}

/// [`ResizeService`] backed by a bounded set of resize processes.
///
/// `tick` must be called periodically from inside a tokio runtime (see
/// [`crate::runtime::Ticker`]).
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.inner.concurrency)
            .field("batch_limit", &self.inner.template.limit())
            .field("pending", &self.pending_jobs())
            .field("active", &self.active_processes())
            .finish()
    }
}

impl WorkerPool {
    /// `template` must be empty; it is cloned for every batch.
    pub fn new(
        template: ProcessBuilder,
        concurrency: usize,
        runner: Arc<dyn ProcessRunner>,
        finder: Arc<dyn FileFinder>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState::default()),
                template,
                concurrency: concurrency.max(1),
                timeout: PROCESS_TIMEOUT,
                runner,
                finder,
            }),
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn active_processes(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn is_source_locked(&self, source: &Path) -> bool {
        self.inner.state.lock().locked_sources.contains(source)
    }

    /// One reap + dispatch pass.
    pub fn tick(&self) {
        let launches = self.inner.plan();
        for launch in launches {
            tracing::debug!(
                batch = launch.id,
                targets = launch.entries.len(),
                command = %launch.command,
                "launching resize batch"
            );
            tokio::spawn(Arc::clone(&self.inner).run_batch(launch));
        }
    }
}

impl ResizeService for WorkerPool {
    fn resize(
        &self,
        source: PathBuf,
        variations: Vec<Variation>,
        observer: Arc<dyn ResizeServiceObserver>,
    ) {
        if variations.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        state.pending.push_back(ResizeJob {
            source,
            variations,
            observer,
        });
        if state.pending.len() % 1000 == 0 {
            tracing::warn!(pending = state.pending.len(), "resize backlog keeps growing");
        }
    }
}

impl PoolInner {
    fn plan(&self) -> Vec<Launch> {
        let mut state = self.state.lock();
        self.reap(&mut state);

        if state.pending.is_empty() || state.active.len() >= self.concurrency {
            return Vec::new();
        }

        let mut launches = Vec::new();
        let mut deferred = Vec::new();
        let mut batch = Batch::new(&self.template);

        while state.active.len() < self.concurrency {
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            if state.locked_sources.contains(&job.source) {
                deferred.push(job);
                continue;
            }

            batch.fold(job);
            if batch.builder.is_full() {
                let full = std::mem::replace(&mut batch, Batch::new(&self.template));
                launches.push(Self::register(&mut state, full));
            }
        }
        if !batch.entries.is_empty() {
            launches.push(Self::register(&mut state, batch));
        }

        if !deferred.is_empty() {
            tracing::trace!(deferred = deferred.len(), "jobs deferred behind running sources");
            state.pending.extend(deferred);
        }
        launches
    }

    fn reap(&self, state: &mut PoolState) {
        for (id, batch) in state.active.iter_mut() {
            let elapsed = batch.started_at.elapsed();
            if elapsed <= self.timeout {
                continue;
            }
            if let Some(terminate) = batch.terminate.take() {
                tracing::warn!(
                    batch = *id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "resize batch timed out, terminating"
                );
                let _ = terminate.send(());
            }
        }
    }

    /// Record a batch as running and lock its sources.
    fn register(state: &mut PoolState, batch: Batch) -> Launch {
        let id = state.next_batch;
        state.next_batch += 1;

        let sources: Vec<PathBuf> = batch.builder.sources().map(Path::to_path_buf).collect();
        state.locked_sources.extend(sources.iter().cloned());

        let (terminate_tx, terminate) = oneshot::channel();
        state.active.insert(
            id,
            ActiveBatch {
                started_at: Instant::now(),
                terminate: Some(terminate_tx),
            },
        );

        Launch {
            id,
            command: batch.builder.build(),
            sources,
            entries: batch.entries,
            terminate,
        }
    }

    async fn run_batch(self: Arc<Self>, launch: Launch) {
        let Launch {
            id,
            command,
            sources,
            entries,
            terminate,
        } = launch;

        let started = Instant::now();
        let exit = self.runner.run(command, terminate).await;
        self.state.lock().active.remove(&id);

        let outcomes = if exit.success() {
            tracing::debug!(
                batch = id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "resize batch finished"
            );
            vec![ResizeOutcome::Complete; entries.len()]
        } else {
            self.recheck(id, &exit, &entries).await
        };

        {
            let mut state = self.state.lock();
            for source in &sources {
                state.locked_sources.remove(source);
            }
        }

        for (entry, outcome) in entries.iter().zip(outcomes) {
            entry.observer.handle_resize(&entry.target, outcome);
        }
    }

    /// After a failed exit the file system decides: a target that exists was
    /// written before the process died.
    async fn recheck(
        &self,
        id: u64,
        exit: &ProcessExit,
        entries: &[BatchEntry],
    ) -> Vec<ResizeOutcome> {
        tracing::warn!(batch = id, exit = ?exit, "resize batch exited unsuccessfully");

        let mut known: HashMap<&Path, ResizeOutcome> = HashMap::new();
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = match known.get(entry.target.as_path()) {
                Some(outcome) => *outcome,
                None => {
                    let outcome = if self.finder.exists(&entry.target).await.is_found() {
                        tracing::warn!(
                            batch = id,
                            source = %entry.source.display(),
                            target = %entry.target.display(),
                            "target written despite failed exit"
                        );
                        ResizeOutcome::Complete
                    } else {
                        tracing::error!(
                            batch = id,
                            source = %entry.source.display(),
                            target = %entry.target.display(),
                            "resize failed"
                        );
                        ResizeOutcome::Failed
                    };
                    known.insert(entry.target.as_path(), outcome);
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
