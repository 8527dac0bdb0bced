//! Engine configuration.
//!
//! Reads the `[store]` section from `config/default.toml`. Every key is
//! optional; a missing file or a missing section yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Settings loaded from the `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the registry file and its backups.
    pub data_dir: PathBuf,
    /// Base name of the registry file (`<db_name>.json`).
    pub db_name: String,
    /// Number of stickers per inline page.
    pub page_size: usize,
    /// Seconds between periodic saves.
    pub backup_interval_secs: u64,
    /// Seconds between integrity self-checks.
    pub integrity_check_interval_secs: u64,
    /// Seconds between result cache sweeps.
    pub cache_sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_name: "users".to_string(),
            page_size: 49,
            backup_interval_secs: 5 * 60,
            integrity_check_interval_secs: 60 * 60,
            cache_sweep_interval_secs: 3 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    store: StoreConfig,
}

impl StoreConfig {
    /// Parse a configuration document.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| StoreError::InvalidArgument(format!("invalid config: {e}")))?;
        file.store.validated()
    }

    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading store config");
                Self::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file missing, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(StoreError::unavailable(path, e)),
        }
    }

    /// Path of the primary registry file.
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.db_name))
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn integrity_check_interval(&self) -> Duration {
        Duration::from_secs(self.integrity_check_interval_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    fn validated(self) -> StoreResult<Self> {
        if self.db_name.trim().is_empty() {
            return Err(StoreError::InvalidArgument("db_name must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(StoreError::InvalidArgument("page_size must be positive".into()));
        }
        let intervals = [
            self.backup_interval_secs,
            self.integrity_check_interval_secs,
            self.cache_sweep_interval_secs,
        ];
        if intervals.contains(&0) {
            return Err(StoreError::InvalidArgument(
                "maintenance intervals must be positive".into(),
            ));
        }
        Ok(self)
    }
}
