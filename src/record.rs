//! The unit of persistence and the store's diagnostic records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SaveError};
use crate::format::SaveFormat;

/// Envelope written to disk for every saved key.
///
/// The payload is an opaque JSON value produced from the caller's
/// `Serialize` type; `type_tag` is recorded for diagnostics and round-trip
/// hinting only and is never dispatched on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRecord {
    pub key: String,
    pub type_tag: String,
    pub payload: serde_json::Value,
    pub version: u32,
    pub checksum: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SaveRecord {
    pub fn new(
        key: impl Into<String>,
        type_tag: impl Into<String>,
        payload: serde_json::Value,
        version: u32,
    ) -> Self {
        Self {
            key: key.into(),
            type_tag: type_tag.into(),
            payload,
            version: version.max(1),
            checksum: None,
            timestamp: Utc::now(),
        }
    }

    /// Canonical serialized payload bytes; checksums are computed over these
    /// before any compression or encryption happens.
    pub fn canonical_payload_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
            .map_err(|err| SaveError::Format(format!("canonicalize payload: {}", err)))
    }
}

/// One entry in the bounded diagnostics ring buffer. Not authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub key: String,
    pub format: SaveFormat,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OperationRecord {
    pub fn success(key: impl Into<String>, format: SaveFormat) -> Self {
        Self {
            key: key.into(),
            format,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(key: impl Into<String>, format: SaveFormat, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            format,
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Notifications published on the store's broadcast channel.
///
/// Every public call also returns its outcome directly; the channel exists
/// so asynchronous auto-save results stay observable.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    SaveCompleted { key: String, format: SaveFormat },
    SaveFailed { key: String, error: SaveError },
    LoadFailed { key: String, error: SaveError },
    Deleted { key: String },
    AutoSaveFlushed { saved: usize, failed: usize },
}
