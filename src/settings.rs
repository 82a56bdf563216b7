//! Store configuration, immutable once the store is opened.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::SaveFormat;

/// Configuration for a [`SaveStore`](crate::SaveStore).
///
/// Changing any of these requires opening a new store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub base_dir: PathBuf,
    pub default_format: SaveFormat,
    pub compression_enabled: bool,
    pub encryption_enabled: bool,
    pub integrity_enabled: bool,
    pub backups_enabled: bool,
    pub max_backups: usize,
    pub auto_save_enabled: bool,
    pub auto_save_interval_ms: u64,
    /// Schema version new records are written at and loads are migrated to.
    pub schema_version: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("saves"),
            default_format: SaveFormat::Binary,
            compression_enabled: true,
            encryption_enabled: false,
            integrity_enabled: true,
            backups_enabled: true,
            max_backups: 3,
            auto_save_enabled: true,
            auto_save_interval_ms: 30_000,
            schema_version: 1,
        }
    }
}

impl StoreSettings {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_default_format(mut self, format: SaveFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encryption_enabled = enabled;
        self
    }

    pub fn with_integrity(mut self, enabled: bool) -> Self {
        self.integrity_enabled = enabled;
        self
    }

    pub fn with_backups(mut self, enabled: bool, max_backups: usize) -> Self {
        self.backups_enabled = enabled;
        self.max_backups = max_backups;
        self
    }

    pub fn with_auto_save(mut self, enabled: bool, interval_ms: u64) -> Self {
        self.auto_save_enabled = enabled;
        self.auto_save_interval_ms = interval_ms;
        self
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version.max(1);
        self
    }
}
