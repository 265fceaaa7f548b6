// src/server.rs
//
// Request handling: request path in, HTTP response out.
//
// Flow per request:
//   gateway lookup -> Image::validate -> (resize via queue) -> file read
//
// Any failure along the way answers 404 "Image not found". Socket handling
// and HTTP parsing live outside this crate.

use crate::config::ServerConfig;
use crate::error::{ErrorCategory, ResizeServerError, Result};
use crate::files::{FileContents, FileFinder, FileReader, FsFileAdapter};
use crate::gateway::ImageGateway;
use crate::image::{ImageEvent, ImageObserver, MissingCause};
use crate::resize::{BackgroundResizeQueue, ProcessRunner, SystemProcessRunner, WorkerPool};
use crate::runtime::Ticker;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub const NOT_FOUND_BODY: &str = "Image not found";

/// Response body: either the image stream or the fixed not-found text.
#[derive(Debug)]
pub enum ImageBody {
    File(FileContents),
    Text(&'static str),
}

impl ImageBody {
    /// Collect the whole body. Meant for tests and small images.
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            ImageBody::File(mut contents) => {
                let mut buf = Vec::with_capacity(contents.size as usize);
                contents.stream.read_to_end(&mut buf).await?;
                Ok(buf)
            }
            ImageBody::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }
}

pub type ImageResponse = Response<ImageBody>;

pub struct ImageServer {
    gateway: ImageGateway,
    finder: Arc<dyn FileFinder>,
    reader: Arc<dyn FileReader>,
    queue: BackgroundResizeQueue,
    pool: WorkerPool,
    content_type: HeaderValue,
    ticker: Mutex<Ticker>,
}

impl std::fmt::Debug for ImageServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageServer")
            .field("gateway", &self.gateway)
            .field("queue", &self.queue)
            .field("pool", &self.pool)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl ImageServer {
    pub fn builder(config: ServerConfig) -> ImageServerBuilder {
        ImageServerBuilder::new(config)
    }

    pub fn queue(&self) -> &BackgroundResizeQueue {
        &self.queue
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stop the periodic ticks and close the queue. Cached variants are still
    /// served; waiting and later resize requests answer not found.
    pub fn shutdown(&self) {
        self.ticker.lock().shutdown();
        self.queue.close();
    }

    pub async fn handle(&self, request_path: &str) -> ImageResponse {
        let path = match self.resolve(request_path).await {
            Ok(path) => path,
            Err(err) => {
                log_not_found(request_path, &err);
                return not_found();
            }
        };

        match self.reader.read(&path).await {
            Ok(contents) => self.found(contents),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read image");
                not_found()
            }
        }
    }

    /// Location of the servable variant for `request_path`, resizing it first
    /// when only the original exists.
    pub async fn resolve(&self, request_path: &str) -> Result<PathBuf> {
        let mut image = self.gateway.find_image(request_path)?;
        let (observer, mut events) = ImageObserver::channel();
        image.validate(self.finder.as_ref(), observer).await;

        while let Some(event) = events.recv().await {
            match event {
                ImageEvent::Delivered { path } => return Ok(path),
                ImageEvent::Missing { path, cause } => {
                    return Err(match cause {
                        MissingCause::SourceMissing => {
                            ResizeServerError::missing_source(path.display().to_string())
                        }
                        MissingCause::ResizeFailed => ResizeServerError::resize_failed(
                            image.target().display().to_string(),
                            "resize tool did not produce the image",
                        ),
                    });
                }
                ImageEvent::ResizeRequested => {
                    if let Some(ticket) = image.resize(&self.queue) {
                        let notice = ticket.wait().await;
                        image.handle_resize(&notice);
                    }
                }
            }
        }

        Err(ResizeServerError::resize_failed(
            image.target().display().to_string(),
            "request abandoned before resolution",
        ))
    }

    fn found(&self, contents: FileContents) -> ImageResponse {
        let size = contents.size;
        let mut response = Response::new(ImageBody::File(contents));
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, self.content_type.clone());
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        response
    }
}

// bad or unknown paths are routine; anything else is worth an operator's look
fn log_not_found(request_path: &str, err: &ResizeServerError) {
    let category = err.category();
    match category {
        ErrorCategory::UserError => {
            tracing::debug!(path = request_path, error = %err, "image not found");
        }
        ErrorCategory::ProcessingError => {
            tracing::warn!(
                path = request_path,
                error = %err,
                category = category.as_str(),
                recoverable = err.is_recoverable(),
                "image could not be resized"
            );
        }
        ErrorCategory::ResourceLimit | ErrorCategory::Configuration => {
            tracing::error!(
                path = request_path,
                error = %err,
                category = category.as_str(),
                "image lookup failed"
            );
        }
    }
}

fn not_found() -> ImageResponse {
    let mut response = Response::new(ImageBody::Text(NOT_FOUND_BODY));
    *response.status_mut() = StatusCode::NOT_FOUND;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(NOT_FOUND_BODY.len()));
    response
}

/// Wires the gateway, file adapter, queue, worker pool and ticks.
pub struct ImageServerBuilder {
    config: ServerConfig,
    finder: Option<Arc<dyn FileFinder>>,
    reader: Option<Arc<dyn FileReader>>,
    runner: Option<Arc<dyn ProcessRunner>>,
}

impl ImageServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            finder: None,
            reader: None,
            runner: None,
        }
    }

    pub fn with_file_finder(mut self, finder: Arc<dyn FileFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    pub fn with_file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Validate the configuration and start the ticks. Must be called inside
    /// a tokio runtime.
    pub fn build(self) -> Result<ImageServer> {
        let config = self.config;
        config.validate()?;

        let content_type = HeaderValue::from_str(&config.content_type).map_err(|e| {
            ResizeServerError::invalid_config("content_type", config.content_type.clone(), e.to_string())
        })?;
        let gateway = ImageGateway::from_config(&config)?;

        let adapter = Arc::new(FsFileAdapter::new().with_writable_root(gateway.save_root()));
        let finder = self.finder.unwrap_or_else(|| adapter.clone());
        let reader = self.reader.unwrap_or(adapter);
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemProcessRunner::new()));

        let pool = WorkerPool::new(
            config.process_builder()?,
            config.workers.concurrency,
            runner,
            Arc::clone(&finder),
        );
        let queue = BackgroundResizeQueue::new(Arc::new(pool.clone()));
        let ticker = Ticker::start(queue.clone(), pool.clone(), &config.intervals);

        tracing::info!(
            source_dir = %gateway.source_root().display(),
            save_dir = %gateway.save_root().display(),
            concurrency = config.workers.concurrency,
            images_per_process = config.workers.images_per_process,
            "image server ready"
        );

        Ok(ImageServer {
            gateway,
            finder,
            reader,
            queue,
            pool,
            content_type,
            ticker: Mutex::new(ticker),
        })
    }
}
