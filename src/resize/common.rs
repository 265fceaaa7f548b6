// src/resize/common.rs
//
// Types shared between the resize queue, the worker pool and their callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

/// One requested output size of a source image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variation {
    pub target: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Variation {
    pub fn new(target: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            target: target.into(),
            width,
            height,
        }
    }

    /// Pixel area used to order resize steps largest first.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeOutcome {
    Complete,
    Failed,
}

/// Resolution of one queued resize, delivered once to every waiting caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeNotice {
    pub target: PathBuf,
    pub source: PathBuf,
    pub outcome: ResizeOutcome,
}

/// Receives per-target results from a [`ResizeService`].
///
/// Called without any scheduler lock held.
pub trait ResizeServiceObserver: Send + Sync {
    fn handle_resize(&self, target: &Path, outcome: ResizeOutcome);
}

/// Scheduler front door. `resize` only records the job; work starts on a
/// later tick.
pub trait ResizeService: Send + Sync {
    fn resize(
        &self,
        source: PathBuf,
        variations: Vec<Variation>,
        observer: Arc<dyn ResizeServiceObserver>,
    );
}

/// One-shot slot a queue caller waits on.
pub type ResizeQueueObserver = oneshot::Sender<ResizeNotice>;

/// Deduplicating front-end in front of a [`ResizeService`]. Never blocks and
/// never starts work synchronously.
pub trait ResizeQueue: Send + Sync {
    fn queue(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        observer: ResizeQueueObserver,
    );
}

/// Pending answer to a [`ResizeQueue::queue`] call.
#[derive(Debug)]
pub struct ResizeTicket {
    receiver: oneshot::Receiver<ResizeNotice>,
    target: PathBuf,
    source: PathBuf,
}

impl ResizeTicket {
    /// Create a ticket together with the observer to hand to the queue.
    pub fn new(source: &Path, target: &Path) -> (Self, ResizeQueueObserver) {
        let (sender, receiver) = oneshot::channel();
        let ticket = Self {
            receiver,
            target: target.to_path_buf(),
            source: source.to_path_buf(),
        };
        (ticket, sender)
    }

    /// Wait for the resize to resolve. A queue dropped before answering
    /// counts as a failure.
    pub async fn wait(self) -> ResizeNotice {
        match self.receiver.await {
            Ok(notice) => notice,
            Err(_) => ResizeNotice {
                target: self.target,
                source: self.source,
                outcome: ResizeOutcome::Failed,
            },
        }
    }
}
