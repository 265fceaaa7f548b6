// src/image.rs
//
// Per-request image entity.
//
// States: Idle -> (validate) -> Delivered | AwaitingResize | Missing
//         AwaitingResize -> (resize) -> Resizing -> Delivered | Missing
//
// Observers registered through `validate` stay pending until the image is
// delivered or found missing. A `validate` while a resize is outstanding only
// joins the pending list.

use crate::files::FileFinder;
use crate::resize::{ResizeNotice, ResizeOutcome, ResizeQueue, ResizeTicket};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingCause {
    /// Neither the cached variant nor the original exists
    SourceMissing,
    /// The resize tool did not produce the variant
    ResizeFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageEvent {
    /// The variant can be read from `path`
    Delivered { path: PathBuf },
    /// The original exists; the caller is expected to call [`Image::resize`]
    ResizeRequested,
    /// Nothing can be served; `path` is the original image
    Missing { path: PathBuf, cause: MissingCause },
}

/// Channel end that receives [`ImageEvent`]s.
#[derive(Clone, Debug)]
pub struct ImageObserver {
    sender: mpsc::UnboundedSender<ImageEvent>,
}

impl ImageObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ImageEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn notify(&self, event: ImageEvent) {
        // receiver gone means the request was abandoned
        let _ = self.sender.send(event);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageState {
    Idle,
    AwaitingResize,
    Resizing,
    Delivered,
    Missing,
}

#[derive(Debug)]
pub struct Image {
    target: PathBuf,
    source: PathBuf,
    width: u32,
    height: u32,
    state: ImageState,
    observers: Vec<ImageObserver>,
}

impl Image {
    pub fn new(target: impl Into<PathBuf>, source: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            width,
            height,
            state: ImageState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn pending_observers(&self) -> usize {
        self.observers.len()
    }

    /// Register `observer` and check whether the variant can be served.
    pub async fn validate(&mut self, finder: &dyn FileFinder, observer: ImageObserver) {
        self.observers.push(observer);
        if self.state == ImageState::Resizing {
            return;
        }

        if finder.exists(&self.target).await.is_found() {
            self.deliver();
            return;
        }

        if finder.exists(&self.source).await.is_found() {
            self.state = ImageState::AwaitingResize;
            for observer in &self.observers {
                observer.notify(ImageEvent::ResizeRequested);
            }
            return;
        }

        self.missing(MissingCause::SourceMissing);
    }

    /// Queue the resize of this variant. Returns `None` when a resize is
    /// already outstanding for this image.
    pub fn resize(&mut self, queue: &dyn ResizeQueue) -> Option<ResizeTicket> {
        if self.state == ImageState::Resizing {
            return None;
        }
        let (ticket, observer) = ResizeTicket::new(&self.source, &self.target);
        queue.queue(&self.source, &self.target, self.width, self.height, observer);
        self.state = ImageState::Resizing;
        Some(ticket)
    }

    /// Apply a resize result. Notices for other targets are ignored and
    /// `false` is returned.
    pub fn handle_resize(&mut self, notice: &ResizeNotice) -> bool {
        if notice.target != self.target {
            return false;
        }
        match notice.outcome {
            ResizeOutcome::Complete => self.deliver(),
            ResizeOutcome::Failed => self.missing(MissingCause::ResizeFailed),
        }
        true
    }

    fn deliver(&mut self) {
        self.state = ImageState::Delivered;
        for observer in std::mem::take(&mut self.observers) {
            observer.notify(ImageEvent::Delivered {
                path: self.target.clone(),
            });
        }
    }

    fn missing(&mut self, cause: MissingCause) {
        self.state = ImageState::Missing;
        for observer in std::mem::take(&mut self.observers) {
            observer.notify(ImageEvent::Missing {
                path: self.source.clone(),
                cause,
            });
        }
    }
}
