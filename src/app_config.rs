//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Without one, defaults apply.

use std::path::{Path, PathBuf};

use dirmodel::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

fn default_attributes() -> Vec<String> {
    vec!["file-info".to_owned()]
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Attributes resolved by `list` and `watch` when `--attrs` is not given.
    #[serde(default = "default_attributes")]
    pub default_attributes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            default_attributes: default_attributes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.engine.validate().err().unwrap_or_default();

        if self.default_attributes.iter().any(String::is_empty) {
            errors.push("default-attributes must not contain empty names.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("dirmodel").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("dirmodel").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/dirmodel/config.toml"));

        paths
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads the external path if given, otherwise the first config file found, otherwise the
    /// defaults. Errors if a config file exists but is malformed or invalid.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let found = external_config_path
            .map(Path::to_path_buf)
            .or_else(Self::find_config_file);
        let Some(path) = found else {
            debug!("No configuration file found; using defaults.");
            return Ok(Self::default());
        };

        let config = Self::load_from_file(&path)?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        debug!("Loaded configuration successfully.");
        Ok(config)
    }
}
