/// Catalog configuration
///
/// Loaded from an optional JSON file. Every field has a default, so an
/// empty object (or no file at all) yields a usable config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment variable naming the JSON config file
pub const CONFIG_ENV: &str = "SLIDE_CZI_CATALOG_CONFIG";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the SQLite catalog file
    pub database_path: PathBuf,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: Self::default_db_path(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl CatalogConfig {
    /// Default catalog location in the user's data directory:
    /// - Linux: ~/.local/share/slide-czi-catalog/catalog.db
    /// - macOS: ~/Library/Application Support/slide-czi-catalog/catalog.db
    /// - Windows: %APPDATA%\slide-czi-catalog\catalog.db
    ///
    /// Falls back to the working directory when no data directory is known.
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("slide-czi-catalog");
        path.push("catalog.db");
        path
    }

    /// Parse a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Use the file named by `SLIDE_CZI_CATALOG_CONFIG` if set, defaults otherwise
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
