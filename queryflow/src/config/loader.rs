//! Reading [`RuntimeConfig`] from strings, files and directories.

use super::RuntimeConfig;
use crate::errors::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration path.
pub const CONFIG_ENV_VAR: &str = "QUERYFLOW_CONFIG";

/// Path used by [`RuntimeConfig::from_env`] when the variable is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config";

const INLINE: &str = "<inline>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }

    fn parse(self, text: &str, origin: &str) -> Result<RuntimeConfig, ConfigError> {
        let parsed = match self {
            Self::Yaml => serde_yaml::from_str::<Option<RuntimeConfig>>(text)
                .map(Option::unwrap_or_default)
                .map_err(|err| err.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|err| err.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            format: match self {
                Self::Yaml => "yaml",
                Self::Json => "json",
            },
            origin: origin.to_string(),
            message,
        })
    }
}

impl RuntimeConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or an invalid workflow error.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Format::Yaml.parse(text, INLINE)?.finalize()
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or an invalid workflow error.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Format::Json.parse(text, INLINE)?.finalize()
    }

    /// Loads one `.yaml`, `.yml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or has an
    /// unsupported extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = read_file(path.as_ref())?.finalize()?;
        info!(path = %path.as_ref().display(), workflows = config.workflows.len(), "Loaded configuration");
        Ok(config)
    }

    /// Loads every `.yaml`, `.yml` and `.json` file in a directory, in file
    /// name order, and merges them.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or any file cannot be read or
    /// parsed, or if two files declare the same workflow.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = path.as_ref();
        let read_err = |source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(read_err)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && Format::of(p).is_some())
            .collect();
        files.sort();

        let mut merged = Self::default();
        for file in &files {
            debug!(path = %file.display(), "Merging configuration file");
            merged.merge(read_file(file)?).map_err(|err| match err {
                ConfigError::Invalid(message) => {
                    ConfigError::invalid(format!("{message} (in {})", file.display()))
                }
                other => other,
            })?;
        }

        let config = merged.finalize()?;
        info!(path = %dir.display(), files = files.len(), workflows = config.workflows.len(), "Loaded configuration directory");
        Ok(config)
    }

    /// Loads a file or a directory.
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::from_file`] and [`RuntimeConfig::from_dir`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    /// Loads from `QUERYFLOW_CONFIG`, or from [`DEFAULT_CONFIG_PATH`].
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::from_path`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(path)
    }
}

fn read_file(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let format = Format::of(path).ok_or_else(|| {
        ConfigError::invalid(format!(
            "unsupported configuration file {} (expected .yaml, .yml or .json)",
            path.display()
        ))
    })?;
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&text, &path.display().to_string())
}
