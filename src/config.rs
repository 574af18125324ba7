//! YAML configuration for the command-line tool
//!
//! ```yaml
//! source:
//!   root: /path/to/photo/library
//! target:
//!   root: /path/to/bucket
//! prefix: ""
//! ```
//!
//! The file lives at `$HOME/.photosync.yaml` unless `PHOTOSYNC_CONFIG`
//! or an explicit path says otherwise.

use crate::error::{Result, SyncError};
use crate::walk::validate_prefix;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PHOTOSYNC_CONFIG";

/// Config file name inside the home directory
pub const CONFIG_FILE_NAME: &str = ".photosync.yaml";

/// Where photos are read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory of the library
    pub root: PathBuf,
}

/// Where photos are written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Root directory of the bucket
    pub root: PathBuf,
}

/// Complete tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Library settings
    pub source: SourceConfig,
    /// Bucket settings
    pub target: TargetConfig,
    /// Default scope for every command
    #[serde(default)]
    pub prefix: String,
}

impl SyncConfig {
    /// Read and validate a config file
    ///
    /// # Errors
    ///
    /// [`SyncError::ConfigNotFound`] if the file does not exist,
    /// [`SyncError::Yaml`] if it does not parse, and whatever
    /// [`validate`](Self::validate) reports.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::ConfigNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Check roots are set and the prefix is well formed
    pub fn validate(&self) -> Result<()> {
        if self.source.root.as_os_str().is_empty() {
            return Err(SyncError::config("source.root must not be empty"));
        }
        if self.target.root.as_os_str().is_empty() {
            return Err(SyncError::config("target.root must not be empty"));
        }
        validate_prefix(&self.prefix)
    }

    /// Path of the config file to use when none is given explicitly
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
            .ok_or_else(|| SyncError::config(format!("HOME is not set; pass --config or set {}", CONFIG_ENV)))
    }

    /// `explicit` if given, the default location otherwise
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }
}
