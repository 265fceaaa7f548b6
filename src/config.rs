// src/config.rs
//
// Server configuration loaded from TOML.
//
// Every section is optional; missing keys fall back to the defaults below.
//
//   base_url    = "/media/catalog/product"
//   url_pattern = "/cache/:width:x:height:/:image:"
//   source_dir  = "/var/www/media"
//   save_dir    = "/var/cache/media"        # optional
//
//   [resize]
//   command = "convert"
//   quality = 85
//   strip   = true
//
//   [workers]
//   concurrency        = 3
//   images_per_process = 10
//
//   [intervals]
//   queue_flush_ms = 100
//   dispatch_ms    = 5
//
//   [logging]
//   level  = "info"
//   format = "pretty"

use crate::error::{ResizeServerError, Result};
use crate::path::{PathParser, DEFAULT_URL_PATTERN};
use crate::resize::{ProcessBuilder, ResizeOptions, DEFAULT_BATCH_LIMIT, DEFAULT_CONCURRENCY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
pub const DEFAULT_RESIZE_COMMAND: &str = "convert";
pub const DEFAULT_QUEUE_FLUSH_MS: u64 = 100;
pub const DEFAULT_DISPATCH_MS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// URL prefix stripped from request paths before they map onto the cache
    pub base_url: String,
    pub url_pattern: String,
    /// Root of the original images
    pub source_dir: PathBuf,
    /// Root of the cached variants; defaults to `source_dir`
    pub save_dir: Option<PathBuf>,
    pub content_type: String,
    pub resize: ResizeConfig,
    pub workers: WorkersConfig,
    pub intervals: IntervalsConfig,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            url_pattern: DEFAULT_URL_PATTERN.to_string(),
            source_dir: PathBuf::from("."),
            save_dir: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            resize: ResizeConfig::default(),
            workers: WorkersConfig::default(),
            intervals: IntervalsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub command: String,
    pub sampling_factor: Option<String>,
    pub quality: Option<u8>,
    pub interlace: Option<String>,
    pub filter: Option<String>,
    pub strip: bool,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_RESIZE_COMMAND.to_string(),
            sampling_factor: None,
            quality: None,
            interlace: None,
            filter: None,
            strip: false,
        }
    }
}

impl ResizeConfig {
    pub fn options(&self) -> ResizeOptions {
        ResizeOptions {
            sampling_factor: self.sampling_factor.clone(),
            quality: self.quality,
            interlace: self.interlace.clone(),
            filter: self.filter.clone(),
            strip: self.strip,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkersConfig {
    /// Maximum number of resize processes running at once
    pub concurrency: usize,
    /// Target entries per resize process
    pub images_per_process: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            images_per_process: DEFAULT_BATCH_LIMIT,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IntervalsConfig {
    pub queue_flush_ms: u64,
    pub dispatch_ms: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            queue_flush_ms: DEFAULT_QUEUE_FLUSH_MS,
            dispatch_ms: DEFAULT_DISPATCH_MS,
        }
    }
}

impl IntervalsConfig {
    pub fn queue_flush(&self) -> Duration {
        Duration::from_millis(self.queue_flush_ms)
    }

    pub fn dispatch(&self) -> Duration {
        Duration::from_millis(self.dispatch_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: ServerConfig =
            toml::from_str(input).map_err(|e| ResizeServerError::config_parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ResizeServerError::config_read(path.display().to_string(), e))?;
        Self::from_toml_str(&input)
    }

    pub fn save_root(&self) -> &Path {
        self.save_dir.as_deref().unwrap_or(&self.source_dir)
    }

    /// `source_dir` resolved against the current directory.
    pub fn absolute_source_root(&self) -> Result<PathBuf> {
        absolute("source_dir", &self.source_dir)
    }

    /// [`Self::save_root`] resolved against the current directory.
    pub fn absolute_save_root(&self) -> Result<PathBuf> {
        match &self.save_dir {
            Some(save_dir) => absolute("save_dir", save_dir),
            None => self.absolute_source_root(),
        }
    }

    /// Empty batch template for the worker pool. Commands run inside the
    /// save root, so both roots are made absolute first.
    pub fn process_builder(&self) -> Result<ProcessBuilder> {
        Ok(ProcessBuilder::new(
            self.resize.command.clone(),
            &self.resize.options(),
            self.workers.images_per_process,
        )
        .with_base_path(self.absolute_save_root()?))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers.concurrency == 0 {
            return Err(ResizeServerError::invalid_config(
                "workers.concurrency",
                "0",
                "at least one resize process is required",
            ));
        }
        if self.workers.images_per_process == 0 {
            return Err(ResizeServerError::invalid_config(
                "workers.images_per_process",
                "0",
                "a batch must hold at least one image",
            ));
        }
        if self.intervals.queue_flush_ms == 0 {
            return Err(ResizeServerError::invalid_config(
                "intervals.queue_flush_ms",
                "0",
                "interval must be positive",
            ));
        }
        if self.intervals.dispatch_ms == 0 {
            return Err(ResizeServerError::invalid_config(
                "intervals.dispatch_ms",
                "0",
                "interval must be positive",
            ));
        }
        if let Some(quality) = self.resize.quality.filter(|q| *q > 100) {
            return Err(ResizeServerError::invalid_config(
                "resize.quality",
                quality.to_string(),
                "quality must be between 1 and 100",
            ));
        }
        if self.resize.command.trim().is_empty() {
            return Err(ResizeServerError::invalid_config(
                "resize.command",
                "",
                "command must not be empty",
            ));
        }
        PathParser::new(&self.url_pattern, &self.base_url)?;
        Ok(())
    }
}

// resize processes run inside the save root, not in our working directory
fn absolute(field: &'static str, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        ResizeServerError::invalid_config(field, path.display().to_string(), e.to_string())
    })?;
    Ok(cwd.join(path).components().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.url_pattern, "/cache/:width:x:height:/:image:");
        assert_eq!(config.workers.concurrency, 3);
        assert_eq!(config.workers.images_per_process, 10);
        assert_eq!(config.intervals.queue_flush(), Duration::from_millis(100));
        assert_eq!(config.intervals.dispatch(), Duration::from_millis(5));
        assert_eq!(config.content_type, "image/jpeg");
        assert_eq!(config.resize.command, "convert");
    }

    #[test]
    fn parses_full_document() {
        let config = ServerConfig::from_toml_str(
            r#"
            base_url = "/media/catalog/product"
            url_pattern = "/thumbnail/:width:x:height:/:any_dir:/:image:"
            source_dir = "/srv/images"
            save_dir = "/srv/cache"
            content_type = "image/webp"

            [resize]
            command = "magick"
            sampling_factor = "4:2:0"
            quality = 85
            interlace = "JPEG"
            filter = "Lanczos"
            strip = true

            [workers]
            concurrency = 8
            images_per_process = 20

            [intervals]
            queue_flush_ms = 250
            dispatch_ms = 10

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.save_root(), Path::new("/srv/cache"));
        assert_eq!(config.resize.quality, Some(85));
        assert!(config.resize.strip);
        assert_eq!(config.workers.concurrency, 8);
        assert_eq!(config.logging.format, LogFormat::Json);

        let builder = config.process_builder().unwrap();
        assert_eq!(builder.limit(), 20);
        let command = builder
            .with_resize(
                Path::new("/srv/images/a.jpg"),
                Path::new("/srv/cache/t/a.jpg"),
                10,
                10,
            )
            .build();
        assert_eq!(command.program, "magick");
        assert_eq!(command.working_dir.as_deref(), Some(Path::new("/srv/cache")));
        assert!(command.args.contains(&"t/a.jpg".to_string()));
        assert!(command.args.contains(&"-strip".to_string()));
    }

    #[test]
    fn relative_roots_resolve_against_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        let config = ServerConfig {
            source_dir: "images".into(),
            save_dir: Some("/srv/cache".into()),
            ..ServerConfig::default()
        };
        assert_eq!(config.absolute_source_root().unwrap(), cwd.join("images"));
        assert_eq!(config.absolute_save_root().unwrap(), Path::new("/srv/cache"));

        let defaults = ServerConfig::default();
        assert_eq!(defaults.absolute_source_root().unwrap(), cwd);
        assert_eq!(defaults.absolute_save_root().unwrap(), cwd);
    }

    #[test]
    fn save_root_defaults_to_source_dir() {
        let config = ServerConfig::from_toml_str(r#"source_dir = "/srv/images""#).unwrap();
        assert_eq!(config.save_root(), Path::new("/srv/images"));
    }

    #[test]
    fn rejects_invalid_values() {
        for input in [
            "[workers]\nconcurrency = 0",
            "[workers]\nimages_per_process = 0",
            "[intervals]\nqueue_flush_ms = 0",
            "[intervals]\ndispatch_ms = 0",
            "[resize]\nquality = 101",
            "[resize]\ncommand = \" \"",
            "url_pattern = \"/cache/:width:x:height:/\"",
            "url_pattern = \"/cache/:image:\"",
        ] {
            let err = ServerConfig::from_toml_str(input).unwrap_err();
            assert!(
                matches!(err, ResizeServerError::InvalidConfig { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn rejects_malformed_toml_and_unknown_keys() {
        assert!(matches!(
            ServerConfig::from_toml_str("base_url = "),
            Err(ResizeServerError::ConfigParse { .. })
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("[workers]\nthreads = 4"),
            Err(ResizeServerError::ConfigParse { .. })
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "[workers]\nconcurrency = 1\n").unwrap();

        assert_eq!(ServerConfig::load(&path).unwrap().workers.concurrency, 1);
        assert!(matches!(
            ServerConfig::load(dir.path().join("missing.toml")),
            Err(ResizeServerError::ConfigRead { .. })
        ));
    }
}
