// ============================================================================
// savekeep — durable local save-state engine
// ============================================================================
//
// Keyed records travel through a fixed serialize → compress? → encrypt?
// pipeline on the way to disk. Loads invert the pipeline exactly, verify an
// integrity checksum computed over the pre-encryption bytes, and walk the
// record through the schema-migration chain. Existing files are backed up
// before every overwrite, and a background worker periodically flushes keys
// with unsaved changes.

pub mod autosave;
pub mod backup;
pub mod device;
pub mod error;
pub mod format;
pub mod migrate;
pub mod record;
pub mod settings;
pub mod store;

// Re-export main types for convenience
pub use autosave::{DirtyEntry, DirtyKeyTracker, FlushReport};
pub use backup::BackupRotator;
pub use device::{DeviceIdentity, MachineDeviceIdentity, StaticDeviceIdentity};
pub use error::{Result, SaveError};
pub use format::{CryptoProvider, FormatCodec, IntegrityVerifier, SaveFormat};
pub use migrate::{MigrationChain, MigrationHandler};
pub use record::{OperationRecord, SaveRecord, StoreEvent};
pub use settings::StoreSettings;
pub use store::{BatchLoad, BatchReport, SaveStore};
