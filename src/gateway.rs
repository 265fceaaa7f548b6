// src/gateway.rs
//
// Resolves request paths to absolute source/target locations.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::image::Image;
use crate::path::PathParser;
use std::path::{Path, PathBuf};

/// Maps a parsed request onto the configured roots. No I/O.
#[derive(Clone, Debug)]
pub struct ImageGateway {
    parser: PathParser,
    source_root: PathBuf,
    save_root: Option<PathBuf>,
}

impl ImageGateway {
    pub fn new(parser: PathParser, source_root: impl Into<PathBuf>) -> Self {
        Self {
            parser,
            source_root: source_root.into(),
            save_root: None,
        }
    }

    /// Store cached variants under `save_root` instead of the source tree.
    pub fn with_save_root(mut self, save_root: impl Into<PathBuf>) -> Self {
        self.save_root = Some(save_root.into());
        self
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let parser = PathParser::new(&config.url_pattern, &config.base_url)?;
        let gateway = Self::new(parser, config.absolute_source_root()?);
        Ok(match &config.save_dir {
            Some(_) => gateway.with_save_root(config.absolute_save_root()?),
            None => gateway,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Directory resized variants are written into.
    pub fn save_root(&self) -> &Path {
        self.save_root.as_deref().unwrap_or(&self.source_root)
    }

    pub fn find_image(&self, request_path: &str) -> Result<Image> {
        let parsed = self.parser.parse(request_path)?;

        Ok(Image::new(
            resolve(self.save_root(), &parsed.target),
            resolve(&self.source_root, &parsed.source),
            parsed.width,
            parsed.height,
        ))
    }
}

// a leading slash must never replace the root
fn resolve(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}
