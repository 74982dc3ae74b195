//! FILENAME: dashboard/src/config.rs
//! PURPOSE: Dashboard configuration, loaded from a JSON file.
//! CONTEXT: Every field has a default, so `{}` is a valid configuration.

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Undo/redo depth of the pivot history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    /// Folder holding the dataset files.
    pub data_folder: PathBuf,
    /// Metadata document describing every dataset.
    pub metadata_file: PathBuf,
    /// Dataset opened at startup; falls back to the metadata default.
    pub default_dataset: Option<String>,
    pub history_capacity: usize,
    /// One of off, error, warn, info, debug, trace.
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_to_stderr: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_folder: PathBuf::from("data"),
            metadata_file: PathBuf::from("metadata.json"),
            default_dataset: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_level: "info".to_string(),
            log_file: None,
            log_to_stderr: false,
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DashboardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file. Relative data and metadata paths are resolved
    /// against the directory containing the file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&json)?;
        if let Some(base) = path.parent() {
            config.data_folder = resolve(base, &config.data_folder);
            config.metadata_file = resolve(base, &config.metadata_file);
            config.log_file = config.log_file.map(|p| resolve(base, &p));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("historyCapacity must be at least 1".to_string()));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level \"{}\"", self.log_level)))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
