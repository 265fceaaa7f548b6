// src/resize/queue.rs
//
// Deduplicating resize queue.
//
// Requests collect between flushes. A target owns one fan-out list from its
// first `queue` call until the scheduler reports back; every later request
// for the same target only joins that list, whether the target is still
// pending or already dispatched. Closing the queue fails every outstanding
// request and every later one.

use super::common::{
    ResizeNotice, ResizeOutcome, ResizeQueue, ResizeQueueObserver, ResizeService,
    ResizeServiceObserver, Variation,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct PendingSource {
    source: PathBuf,
    variations: Vec<Variation>,
}

struct FanOut {
    source: PathBuf,
    observers: Vec<ResizeQueueObserver>,
    dispatched: bool,
}

impl FanOut {
    fn notify(self, target: &Path, outcome: ResizeOutcome) {
        for observer in self.observers {
            // receiver gone means the request was abandoned
            let _ = observer.send(ResizeNotice {
                target: target.to_path_buf(),
                source: self.source.clone(),
                outcome,
            });
        }
    }
}

#[derive(Default)]
struct QueueState {
    // sources in order of their first request
    pending: Vec<PendingSource>,
    fan_out: HashMap<PathBuf, FanOut>,
    closed: bool,
}

struct QueueInner {
    service: Arc<dyn ResizeService>,
    state: Mutex<QueueState>,
}

/// [`ResizeQueue`] that hands batches to a [`ResizeService`] on every
/// `tick`.
#[derive(Clone)]
pub struct BackgroundResizeQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for BackgroundResizeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BackgroundResizeQueue")
            .field("pending_sources", &state.pending.len())
            .field("locked_targets", &state.fan_out.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl BackgroundResizeQueue {
    pub fn new(service: Arc<dyn ResizeService>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                service,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Targets that already have a resize pending or running.
    pub fn is_target_locked(&self, target: &Path) -> bool {
        self.inner.state.lock().fan_out.contains_key(target)
    }

    pub fn pending_sources(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Stop accepting work. Every outstanding request, pending or already
    /// dispatched, is answered with [`ResizeOutcome::Failed`]; so is every
    /// request queued afterwards.
    pub fn close(&self) {
        let outstanding = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.pending.clear();
            std::mem::take(&mut state.fan_out)
        };

        if !outstanding.is_empty() {
            tracing::info!(targets = outstanding.len(), "resize queue closed, failing outstanding requests");
        }
        for (target, fan_out) in outstanding {
            fan_out.notify(&target, ResizeOutcome::Failed);
        }
    }

    /// Submit every pending source as one job.
    pub fn tick(&self) {
        let pending = {
            let mut state = self.inner.state.lock();
            let pending = std::mem::take(&mut state.pending);
            for source in &pending {
                for variation in &source.variations {
                    if let Some(fan_out) = state.fan_out.get_mut(&variation.target) {
                        fan_out.dispatched = true;
                    }
                }
            }
            pending
        };

        if pending.is_empty() {
            return;
        }
        tracing::debug!(sources = pending.len(), "flushing resize queue");

        let observer: Arc<dyn ResizeServiceObserver> = self.inner.clone();
        for PendingSource { source, variations } in pending {
            self.inner
                .service
                .resize(source, variations, Arc::clone(&observer));
        }
    }
}

impl ResizeQueue for BackgroundResizeQueue {
    fn queue(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        observer: ResizeQueueObserver,
    ) {
        let mut state = self.inner.state.lock();

        if state.closed {
            drop(state);
            tracing::debug!(target = %target.display(), "resize queue closed, rejecting request");
            let _ = observer.send(ResizeNotice {
                target: target.to_path_buf(),
                source: source.to_path_buf(),
                outcome: ResizeOutcome::Failed,
            });
            return;
        }

        if let Some(fan_out) = state.fan_out.get_mut(target) {
            tracing::trace!(
                target = %target.display(),
                dispatched = fan_out.dispatched,
                "joining outstanding resize"
            );
            fan_out.observers.push(observer);
            return;
        }

        state.fan_out.insert(
            target.to_path_buf(),
            FanOut {
                source: source.to_path_buf(),
                observers: vec![observer],
                dispatched: false,
            },
        );

        let variation = Variation::new(target, width, height);
        match state.pending.iter_mut().find(|p| p.source == source) {
            Some(pending) => pending.variations.push(variation),
            None => state.pending.push(PendingSource {
                source: source.to_path_buf(),
                variations: vec![variation],
            }),
        }
    }
}

impl ResizeServiceObserver for QueueInner {
    fn handle_resize(&self, target: &Path, outcome: ResizeOutcome) {
        let Some(fan_out) = self.state.lock().fan_out.remove(target) else {
            return;
        };
        fan_out.notify(target, outcome);
    }
}
