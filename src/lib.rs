// lib.rs
//
// image-resize-server: on-demand resized image cache
//
// Design goals:
// - Serve cached variants straight from disk
// - Resize missing variants from the original on first request
// - Collapse concurrent requests for the same variant into one resize
// - Batch many variants into a few resize-tool invocations
// - Bound the number of running resize processes

pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod image;
pub mod logging;
pub mod path;
pub mod resize;
pub mod runtime;
pub mod server;

pub use config::ServerConfig;
pub use error::{ErrorCategory, ResizeServerError, Result};
pub use files::{FileContents, FileFinder, FileLookup, FileReader, FsFileAdapter, InMemoryFileStore};
pub use gateway::ImageGateway;
pub use image::{Image, ImageEvent, ImageObserver, ImageState, MissingCause};
pub use path::{ParsedRequest, PathParser, MAX_DIMENSION};
pub use runtime::Ticker;
pub use server::{ImageBody, ImageResponse, ImageServer, ImageServerBuilder};
