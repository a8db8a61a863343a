//! # Mekarindah Common
//!
//! Shared plumbing for the Mekarindah service worker crates.
//!
//! ## Features
//!
//! - Logging configuration and setup on top of `tracing-subscriber`
//! - JSON configuration file loading
//! - A configuration error type shared by every crate that reads config

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{load_json_file, load_json_str};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration was not valid JSON for the expected shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value parsed but violates a constraint.
    #[error("Invalid config value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    /// Logging could not be installed (usually: already installed).
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Create a validation error for a named field.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "read",
            ConfigError::Parse(_) => "parse",
            ConfigError::Invalid { .. } => "invalid",
            ConfigError::Logging(_) => "logging",
        }
    }
}
