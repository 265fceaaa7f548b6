// src/error.rs
//
// Unified error handling for image-resize-server
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Bad request path or missing original, answered with 404
// - ProcessingError: The resize tool could not produce a target
// - ResourceLimit: File system / I/O trouble
// - Configuration: Invalid settings or logging setup

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid or unresolvable request, recoverable by the client
    UserError,
    /// Resize subprocess failed to produce output
    ProcessingError,
    /// File system or I/O limits
    ResourceLimit,
    /// Configuration or bootstrap problems
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::ProcessingError => "ProcessingError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::Configuration => "Configuration",
        }
    }
}

/// image-resize-server error types
#[derive(Debug, Error)]
pub enum ResizeServerError {
    // Request Errors
    #[error("Request path is not valid \"{path}\": {reason}")]
    InvalidPath {
        path: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Requested dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u64, max: u32 },

    #[error("Source image not found: {path}")]
    MissingSource { path: Cow<'static, str> },

    // Resize Errors
    #[error("Resize failed for '{target}': {reason}")]
    ResizeFailed {
        target: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Failed to start '{program}': {message}")]
    ProcessSpawnFailed {
        program: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Configuration Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidConfig {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ConfigParse { message: Cow<'static, str> },

    #[error("Failed to initialise logging: {message}")]
    LoggingInit { message: Cow<'static, str> },
}

// Constructor Helpers
impl ResizeServerError {
    pub fn invalid_path(
        path: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u64, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn missing_source(path: impl Into<Cow<'static, str>>) -> Self {
        Self::MissingSource { path: path.into() }
    }

    pub fn resize_failed(
        target: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn process_spawn_failed(
        program: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ProcessSpawnFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_config(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn config_read(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }

    pub fn config_parse(message: impl Into<Cow<'static, str>>) -> Self {
        Self::ConfigParse {
            message: message.into(),
        }
    }

    pub fn logging_init(message: impl Into<Cow<'static, str>>) -> Self {
        Self::LoggingInit {
            message: message.into(),
        }
    }

    /// Check if a repeated request could succeed without operator action.
    ///
    /// Resize failures are recoverable: nothing is retried automatically, but
    /// the next identical request starts a fresh resize.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ProcessingError => true,
            ErrorCategory::ResourceLimit | ErrorCategory::Configuration => false,
        }
    }

    /// Errors answered with a plain 404 by the request layer.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. }
                | Self::DimensionExceedsLimit { .. }
                | Self::MissingSource { .. }
                | Self::ResizeFailed { .. }
                | Self::FileReadFailed { .. }
        )
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPath { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::MissingSource { .. } => ErrorCategory::UserError,

            Self::ResizeFailed { .. } | Self::ProcessSpawnFailed { .. } => {
                ErrorCategory::ProcessingError
            }

            Self::FileReadFailed { .. } => ErrorCategory::ResourceLimit,

            Self::InvalidConfig { .. }
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::LoggingInit { .. } => ErrorCategory::Configuration,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ResizeServerError>;
