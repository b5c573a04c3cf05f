//! Runtime configuration.
//!
//! Every field has a default, so a configuration file only needs the keys it
//! changes:
//!
//! ```json
//! {
//!   "max_gzip_members": 16,
//!   "temp_root": "/var/tmp/nestarc",
//!   "implementations": { "GZip": "Stream" }
//! }
//! ```

use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{Format, Implementation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of directories created for nested-archive extraction.
pub const TEMP_PREFIX: &str = "nestarc-";

/// Settings shared by the facade and the navigator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Upper bound on GZIP members discovered per stream; negative scans all.
    pub max_gzip_members: i64,
    /// Parent directory for extraction directories (system temp if unset).
    pub temp_root: Option<PathBuf>,
    /// Extract nested archives to disk even when they could be buffered.
    pub extract_seekable_nested: bool,
    /// Implementation to use per format instead of the preferred one.
    pub implementations: BTreeMap<Format, Implementation>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_gzip_members: -1,
            temp_root: None,
            extract_seekable_nested: false,
            implementations: BTreeMap::new(),
        }
    }
}

impl ArchiveConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ArchiveError::invalid_data(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject overrides that name no concrete format or implementation.
    pub fn validate(&self) -> Result<()> {
        for (format, implementation) in &self.implementations {
            if *format == Format::None {
                return Err(ArchiveError::out_of_range("format", format));
            }
            if matches!(implementation, Implementation::None | Implementation::Any) {
                return Err(ArchiveError::out_of_range("implementation", implementation));
            }
        }
        Ok(())
    }

    /// Configured implementation override for a format.
    pub fn implementation_for(&self, format: Format) -> Option<Implementation> {
        self.implementations.get(&format).copied()
    }

    /// Create a fresh extraction directory under `temp_root`.
    pub fn create_temp_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        match &self.temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}
