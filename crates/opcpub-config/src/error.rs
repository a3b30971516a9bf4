// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while loading publisher configuration.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("Failed to read configuration file '{}': {source}", path.display())]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not map to a known format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The offending extension.
        format: String,
    },

    /// The document is not valid for its format or does not match the schema.
    #[error("Failed to parse configuration from {origin}: {message}")]
    Parse {
        /// File path, or a description of an in-memory source.
        origin: String,
        /// Parser message.
        message: String,
    },

    /// A `${VAR}` placeholder has no value and no default in strict mode.
    #[error("Environment variable '{name}' referenced by the configuration is not set")]
    EnvVarNotFound {
        /// The environment variable name.
        name: String,
    },

    /// A value parsed but is out of range.
    #[error("Invalid value for '{field}': {message}")]
    Validation {
        /// Dotted path of the field, e.g. `session.timeout_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The global tracing subscriber could not be installed.
    #[error("Failed to initialize logging: {message}")]
    Logging {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error for a file.
    pub fn parse_file(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Creates a parse error for an in-memory document.
    pub fn parse_inline(format: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: format!("inline {} document", format),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the file was simply absent, so a caller may fall
    /// back to defaults.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::FileNotFound { .. })
    }

    /// The offending field for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Short kind tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "file_not_found",
            ConfigError::Io { .. } => "io",
            ConfigError::UnsupportedFormat { .. } => "unsupported_format",
            ConfigError::Parse { .. } => "parse",
            ConfigError::EnvVarNotFound { .. } => "env_var_not_found",
            ConfigError::Validation { .. } => "validation",
            ConfigError::Logging { .. } => "logging",
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
