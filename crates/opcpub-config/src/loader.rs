// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for the publisher.
//!
//! # Loading Pipeline
//!
//! 1. Read the file (format chosen by extension)
//! 2. Substitute `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Deserialize into [`PublisherConfig`]
//! 4. Validate

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::PublisherConfig;

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML, parsed through the `config` crate.
    Yaml,
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            "" => Err(ConfigError::UnsupportedFormat {
                format: "(no extension)".to_string(),
            }),
            other => Err(ConfigError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn deserialize<T: DeserializeOwned>(self, content: &str) -> Result<T, String> {
        match self {
            ConfigFormat::Yaml => config::Config::builder()
                .add_source(config::File::from_str(content, config::FileFormat::Yaml))
                .build()
                .and_then(|c| c.try_deserialize())
                .map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholders {
    Off,
    Lenient,
    Strict,
}

/// Configuration loader.
///
/// ```no_run
/// use opcpub_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_strict_env_vars(true)
///     .load("publisher.yaml")?;
/// # Ok::<(), opcpub_config::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    placeholders: Placeholders,
}

impl ConfigLoader {
    /// Creates a loader that substitutes placeholders and keeps unresolved
    /// ones verbatim.
    pub fn new() -> Self {
        Self {
            placeholders: Placeholders::Lenient,
        }
    }

    /// Enables or disables placeholder substitution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.placeholders = match (enabled, self.placeholders) {
            (false, _) => Placeholders::Off,
            (true, Placeholders::Off) => Placeholders::Lenient,
            (true, mode) => mode,
        };
        self
    }

    /// Fails on placeholders with neither a value nor a default.
    pub fn with_strict_env_vars(mut self, strict: bool) -> Self {
        self.placeholders = if strict {
            Placeholders::Strict
        } else {
            Placeholders::Lenient
        };
        self
    }

    /// Loads and validates a configuration file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<PublisherConfig> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        let raw = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let content = self.substitute(&raw)?;
        let config: PublisherConfig = format
            .deserialize(&content)
            .map_err(|message| ConfigError::parse_file(path, message))?;
        config.validate()?;

        info!(path = %path.display(), format = format.extension(), "Configuration loaded");
        debug!(
            session_timeout_secs = config.session.timeout_secs,
            reconcile_interval_secs = config.reconcile.interval_secs,
            max_concurrent_passes = config.reconcile.max_concurrent_passes,
            "Publisher settings"
        );
        Ok(config)
    }

    /// Loads and validates configuration held in memory.
    pub fn load_from_str(
        &self,
        content: &str,
        format: ConfigFormat,
    ) -> ConfigResult<PublisherConfig> {
        let content = self.substitute(content)?;
        let config: PublisherConfig = format
            .deserialize(&content)
            .map_err(|message| ConfigError::parse_inline(format.extension(), message))?;
        config.validate()?;
        Ok(config)
    }

    fn substitute(&self, content: &str) -> ConfigResult<String> {
        if self.placeholders == Placeholders::Off {
            return Ok(content.to_string());
        }

        let mut out = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                // Unterminated: keep the tail as written.
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let body = &after[..end];
            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match (env::var(name), default) {
                (Ok(value), _) => out.push_str(&value),
                (Err(_), Some(default)) => out.push_str(default),
                (Err(_), None) if self.placeholders == Placeholders::Strict => {
                    return Err(ConfigError::EnvVarNotFound {
                        name: name.to_string(),
                    });
                }
                (Err(_), None) => {
                    warn!(variable = name, "Environment variable not set, keeping placeholder");
                    out.push_str(&rest[start..start + end + 3]);
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<PublisherConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<PublisherConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
session:
  timeout_secs: 20
  creation_backoff_max: 3
  use_security: false

subscription:
  default_sampling_interval_ms: 250

reconcile:
  interval_secs: 10

logging:
  level: debug
"#;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = temp_file(".yaml", YAML);
        let config = ConfigLoader::new().load(file.path()).unwrap();

        assert_eq!(config.session.timeout_secs, 20);
        assert_eq!(config.session.creation_backoff_max, 3);
        assert!(!config.session.use_security);
        assert_eq!(config.subscription.default_sampling_interval_ms, 250);
        assert_eq!(config.reconcile.interval_secs, 10);
        assert_eq!(config.reconcile.max_concurrent_passes, 4);
    }

    #[test]
    fn test_load_toml() {
        let file = temp_file(".toml", "[session]\ntimeout_secs = 15\n\n[telemetry]\nstatus = true\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.session.timeout_secs, 15);
        assert!(config.telemetry.status);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("publisher.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("publisher.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(ConfigFormat::Json.extension(), "json");
        assert!(ConfigFormat::from_path(Path::new("publisher.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("publisher")).is_err());
    }

    #[test]
    fn test_placeholder_default() {
        let out = ConfigLoader::new()
            .substitute("timeout_secs: ${OPCPUB_TEST_UNSET_VAR:45}")
            .unwrap();
        assert_eq!(out, "timeout_secs: 45");
    }

    #[test]
    fn test_placeholder_missing() {
        let out = ConfigLoader::new()
            .substitute("a: ${OPCPUB_TEST_UNSET_VAR} b: 1")
            .unwrap();
        assert_eq!(out, "a: ${OPCPUB_TEST_UNSET_VAR} b: 1");

        let strict = ConfigLoader::new().with_strict_env_vars(true);
        assert!(matches!(
            strict.substitute("value: ${OPCPUB_TEST_UNSET_VAR}"),
            Err(ConfigError::EnvVarNotFound { .. })
        ));
    }

    #[test]
    fn test_placeholder_unterminated_kept() {
        let out = ConfigLoader::new().substitute("value: ${OPEN").unwrap();
        assert_eq!(out, "value: ${OPEN");
    }

    #[test]
    fn test_placeholders_disabled() {
        let loader = ConfigLoader::new()
            .with_strict_env_vars(true)
            .with_env_vars(false);
        let out = loader.substitute("value: ${OPCPUB_TEST_UNSET_VAR}").unwrap();
        assert_eq!(out, "value: ${OPCPUB_TEST_UNSET_VAR}");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = load_config_str(r#"{"reconcile": {"interval_secs": 0}}"#, ConfigFormat::Json);
        assert_eq!(
            result.unwrap_err().field(),
            Some("reconcile.interval_secs")
        );
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = temp_file(".json", "{ not json");
        let err = ConfigLoader::new().load(file.path()).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_inline_parse_error() {
        let err = load_config_str("session = [", ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("inline toml document"));
    }

    #[test]
    fn test_file_not_found() {
        let err = ConfigLoader::new()
            .load("/nonexistent/path/publisher.yaml")
            .unwrap_err();
        assert!(err.is_missing_file());
    }
}
