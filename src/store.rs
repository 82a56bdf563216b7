//! The save-store façade wiring codec, backups, integrity, and migration
//! together per call, plus the auto-save lifecycle.

use std::any::type_name;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use crate::autosave::{AutoSaveWorker, DirtyKeyTracker, FlushReport, spawn_auto_save_worker};
use crate::backup::BackupRotator;
use crate::device::DeviceIdentity;
use crate::error::{Result, SaveError};
use crate::format::{CryptoProvider, FormatCodec, IntegrityVerifier, SaveFormat};
use crate::migrate::MigrationChain;
use crate::record::{OperationRecord, SaveRecord, StoreEvent};
use crate::settings::StoreSettings;

const OPERATION_LOG_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 128;
const CLOSE_FLUSH_TIMEOUT_MS: u64 = 5_000;

/// Per-key result of a batch save. Overall success is the conjunction of the
/// individual results; one key's failure never aborts its siblings.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, SaveError)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a batch load; keys that failed decode carry their error and
/// fall back to the supplied default in `values`.
#[derive(Debug)]
pub struct BatchLoad<T> {
    pub values: HashMap<String, T>,
    pub failed: Vec<(String, SaveError)>,
}

// Manual impl: an empty report needs no `T: Default` bound.
impl<T> Default for BatchLoad<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchLoad<T> {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Durable keyed save store.
///
/// One instance owns every file under its base directory. Construct it once
/// and share it by `Arc`; there is no global instance.
pub struct SaveStore {
    core: Arc<StoreCore>,
    worker: StdMutex<Option<AutoSaveWorker>>,
    closed: AtomicBool,
}

impl SaveStore {
    /// Opens a store with no migrations registered.
    pub async fn open(
        settings: StoreSettings,
        identity: Arc<dyn DeviceIdentity>,
    ) -> Result<Self> {
        Self::open_with_migrations(settings, identity, MigrationChain::new()).await
    }

    /// Opens a store, creating the base directory if needed.
    ///
    /// Encryption key material is derived here, once, and held immutable
    /// for the store's lifetime.
    pub async fn open_with_migrations(
        settings: StoreSettings,
        identity: Arc<dyn DeviceIdentity>,
        migrations: MigrationChain,
    ) -> Result<Self> {
        fs::create_dir_all(&settings.base_dir)
            .await
            .map_err(|err| SaveError::Io(err.to_string()))?;

        let crypto = CryptoProvider::derive(identity.as_ref());
        let codec = FormatCodec::new(
            crypto,
            settings.compression_enabled,
            settings.encryption_enabled,
        );
        let integrity = IntegrityVerifier::new(settings.integrity_enabled);
        let rotator = BackupRotator::new(settings.backups_enabled, settings.max_backups);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let core = StoreCore {
            settings,
            codec,
            integrity,
            rotator,
            migrations,
            tracker: DirtyKeyTracker::default(),
            operations: StdMutex::new(VecDeque::with_capacity(OPERATION_LOG_CAPACITY)),
            events,
        };

        Ok(Self {
            core: Arc::new(core),
            worker: StdMutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.core.settings
    }

    /// Subscribes to save/load/auto-save notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.core.events.subscribe()
    }

    /// Recent operations from the bounded diagnostics ring, newest last.
    pub fn recent_operations(&self) -> Result<Vec<OperationRecord>> {
        Ok(self.core.operations.lock()?.iter().cloned().collect())
    }

    /// Saves `value` under `key` in the given format.
    ///
    /// Backs up any existing file first, then writes atomically; a failure
    /// leaves the prior file on disk untouched. Two concurrent saves to the
    /// same key are not serialized against each other; the last writer wins
    /// at the filesystem level.
    pub async fn save<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        format: SaveFormat,
    ) -> Result<()> {
        let payload = to_payload(value)?;
        self.core
            .save_payload_logged(key, type_name::<T>(), payload, format)
            .await
    }

    /// Loads `key`, returning `default` when the file is missing or any
    /// internal error occurs. This call never fails to the caller; errors
    /// surface as a `LoadFailed` event and an operation-log entry.
    pub async fn load<T: DeserializeOwned>(
        &self,
        key: &str,
        format: SaveFormat,
        default: T,
    ) -> T {
        match self.core.load_logged(key, format).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(_) => default,
        }
    }

    /// Like [`load`](Self::load) but surfaces the error and distinguishes a
    /// missing file (`Ok(None)`) from a failed decode.
    pub async fn try_load<T: DeserializeOwned>(
        &self,
        key: &str,
        format: SaveFormat,
    ) -> Result<Option<T>> {
        self.core.load_logged(key, format).await
    }

    /// Removes the key's files across all formats and clears any pending
    /// dirty entry. Returns whether anything was deleted.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut deleted = false;
        for format in SaveFormat::ALL {
            let path = self.core.file_path(key, format);
            match fs::remove_file(&path).await {
                Ok(()) => {
                    self.core
                        .record_operation(OperationRecord::success(key, format));
                    deleted = true;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    let err = SaveError::Io(err.to_string());
                    self.core
                        .record_operation(OperationRecord::failure(key, format, err.to_string()));
                    return Err(err);
                }
            }
        }
        self.core.tracker.clear(key)?;
        if deleted {
            self.core.emit(StoreEvent::Deleted {
                key: key.to_string(),
            });
        }
        Ok(deleted)
    }

    /// File-presence check only; nothing is decoded.
    pub async fn exists(&self, key: &str, format: SaveFormat) -> bool {
        fs::metadata(self.core.file_path(key, format))
            .await
            .is_ok()
    }

    /// Saves each entry individually; per-key failures are collected, not
    /// propagated.
    pub async fn save_batch<T: Serialize>(
        &self,
        entries: &[(String, T)],
        format: SaveFormat,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (key, value) in entries {
            let result = match to_payload(value) {
                Ok(payload) => {
                    self.core
                        .save_payload_logged(key, type_name::<T>(), payload, format)
                        .await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => report.succeeded.push(key.clone()),
                Err(err) => report.failed.push((key.clone(), err)),
            }
        }
        report
    }

    /// Loads each key individually; missing files and failures both fall
    /// back to a clone of `default`, failures additionally carry the error.
    pub async fn load_batch<T: DeserializeOwned + Clone>(
        &self,
        keys: &[String],
        format: SaveFormat,
        default: T,
    ) -> BatchLoad<T> {
        let mut out = BatchLoad::default();
        for key in keys {
            match self.core.load_logged::<T>(key, format).await {
                Ok(Some(value)) => {
                    out.values.insert(key.clone(), value);
                }
                Ok(None) => {
                    out.values.insert(key.clone(), default.clone());
                }
                Err(err) => {
                    out.values.insert(key.clone(), default.clone());
                    out.failed.push((key.clone(), err));
                }
            }
        }
        out
    }

    /// Marks `key` dirty with a snapshot of `value`; the background worker
    /// flushes it on the next cycle. Registering the first key starts the
    /// worker when auto-save is enabled.
    pub fn register_auto_save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        validate_key(key)?;
        let payload = to_payload(value)?;
        self.core
            .tracker
            .mark_dirty(key, type_name::<T>(), payload)?;
        if self.core.settings.auto_save_enabled && !self.closed.load(Ordering::Acquire) {
            self.ensure_worker()?;
        }
        Ok(())
    }

    /// Drops any pending dirty entry for `key`.
    pub fn unregister_auto_save(&self, key: &str) -> Result<bool> {
        self.core.tracker.clear(key)
    }

    /// Keys currently awaiting an auto-save flush.
    pub fn dirty_keys(&self) -> Result<Vec<String>> {
        self.core.tracker.dirty_keys()
    }

    /// Foreground flush of everything currently dirty, using the default
    /// format. The background worker runs the same routine.
    pub async fn flush_dirty(&self) -> Result<FlushReport> {
        self.core.flush_dirty().await
    }

    /// Stops the auto-save worker and performs one best-effort final flush
    /// bounded by a fixed timeout. Flush errors are logged, not returned;
    /// shutdown proceeds regardless.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let worker = self.worker.lock()?.take();
        if let Some(worker) = worker {
            worker.stop().await;
        }

        match timeout(
            Duration::from_millis(CLOSE_FLUSH_TIMEOUT_MS),
            self.core.flush_dirty(),
        )
        .await
        {
            Ok(Ok(report)) if !report.failed.is_empty() => {
                warn!("final flush left {} keys dirty", report.failed.len());
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("final flush failed: {}", err),
            Err(_) => warn!("final flush timed out after {}ms", CLOSE_FLUSH_TIMEOUT_MS),
        }
        Ok(())
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut guard = self.worker.lock()?;
        if guard.is_none() {
            *guard = Some(spawn_auto_save_worker(
                self.core.clone(),
                self.core.settings.auto_save_interval_ms,
            ));
        }
        Ok(())
    }
}

/// Everything the background worker shares with the façade.
pub(crate) struct StoreCore {
    pub(crate) settings: StoreSettings,
    codec: FormatCodec,
    integrity: IntegrityVerifier,
    rotator: BackupRotator,
    migrations: MigrationChain,
    pub(crate) tracker: DirtyKeyTracker,
    operations: StdMutex<VecDeque<OperationRecord>>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreCore {
    pub(crate) fn file_path(&self, key: &str, format: SaveFormat) -> PathBuf {
        self.settings.base_dir.join(format.file_name(key))
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn record_operation(&self, record: OperationRecord) {
        match self.operations.lock() {
            Ok(mut log) => {
                if log.len() == OPERATION_LOG_CAPACITY {
                    log.pop_front();
                }
                log.push_back(record);
            }
            Err(err) => warn!("operation log unavailable: {}", err),
        }
    }

    /// Save with operation-log and event bookkeeping wrapped around it.
    pub(crate) async fn save_payload_logged(
        &self,
        key: &str,
        type_tag: &str,
        payload: serde_json::Value,
        format: SaveFormat,
    ) -> Result<()> {
        let result = self.save_payload(key, type_tag, payload, format).await;
        match &result {
            Ok(()) => {
                self.record_operation(OperationRecord::success(key, format));
                self.emit(StoreEvent::SaveCompleted {
                    key: key.to_string(),
                    format,
                });
            }
            Err(err) => {
                self.record_operation(OperationRecord::failure(key, format, err.to_string()));
                self.emit(StoreEvent::SaveFailed {
                    key: key.to_string(),
                    error: err.clone(),
                });
            }
        }
        result
    }

    async fn save_payload(
        &self,
        key: &str,
        type_tag: &str,
        payload: serde_json::Value,
        format: SaveFormat,
    ) -> Result<()> {
        validate_key(key)?;

        let mut record = SaveRecord::new(key, type_tag, payload, self.settings.schema_version);
        // Checksum over canonical bytes happens before any compression or
        // encryption.
        let canonical = record.canonical_payload_bytes()?;
        record.checksum = self.integrity.checksum(&canonical);

        let bytes = self.codec.encode(&record, format)?;
        let path = self.file_path(key, format);

        // Backup happens-before overwrite; a backup failure is non-fatal to
        // the save itself but lands in the operation log.
        if let Err(err) = self.rotator.backup_if_exists(&path).await {
            warn!("backup before overwrite of '{}': {}", key, err);
            self.record_operation(OperationRecord::failure(
                key,
                format,
                format!("backup: {}", err),
            ));
        }

        let file_name = format.file_name(key);
        let tmp_path = path.with_file_name(format!("{}.tmp", file_name));
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|err| SaveError::Io(err.to_string()))?;
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            // A failed swap must not leave the temp artifact behind.
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SaveError::Io(err.to_string()));
        }
        Ok(())
    }

    /// Load with bookkeeping; `Ok(None)` means the file does not exist and
    /// is not treated as a failure.
    pub(crate) async fn load_logged<T: DeserializeOwned>(
        &self,
        key: &str,
        format: SaveFormat,
    ) -> Result<Option<T>> {
        let result = self.load_value(key, format).await;
        match &result {
            Ok(Some(_)) => self.record_operation(OperationRecord::success(key, format)),
            Ok(None) => {}
            Err(err) => {
                self.record_operation(OperationRecord::failure(key, format, err.to_string()));
                self.emit(StoreEvent::LoadFailed {
                    key: key.to_string(),
                    error: err.clone(),
                });
            }
        }
        result
    }

    async fn load_value<T: DeserializeOwned>(
        &self,
        key: &str,
        format: SaveFormat,
    ) -> Result<Option<T>> {
        validate_key(key)?;

        let path = self.file_path(key, format);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SaveError::Io(err.to_string())),
        };

        let mut record = self.codec.decode(&bytes, format)?;

        // Verify happens-before migration; a mismatch fails closed.
        let canonical = record.canonical_payload_bytes()?;
        if !self.integrity.verify(&canonical, record.checksum.as_deref()) {
            return Err(SaveError::Integrity(format!(
                "checksum mismatch for '{}'",
                key
            )));
        }

        self.migrations
            .upgrade(&mut record, self.settings.schema_version)?;

        let value = serde_json::from_value(record.payload)
            .map_err(|err| SaveError::Format(format!("deserialize payload: {}", err)))?;
        Ok(Some(value))
    }

    /// Flushes the current dirty snapshot through the default format.
    ///
    /// Keys that fail stay dirty for the next cycle (at-least-once, not
    /// exactly-once); a key re-marked during the flush also stays dirty.
    pub(crate) async fn flush_dirty(&self) -> Result<FlushReport> {
        let entries = self.tracker.snapshot()?;
        let mut report = FlushReport::default();

        for entry in entries {
            let saved = self
                .save_payload_logged(
                    &entry.key,
                    &entry.type_tag,
                    entry.payload.clone(),
                    self.settings.default_format,
                )
                .await;
            match saved {
                Ok(()) => {
                    self.tracker.clear_if_unmodified(&entry.key, entry.marked_at)?;
                    report.saved.push(entry.key);
                }
                Err(err) => {
                    warn!("auto-save of '{}' failed: {}", entry.key, err);
                    report.failed.push(entry.key);
                }
            }
        }

        if !report.is_empty() {
            self.emit(StoreEvent::AutoSaveFlushed {
                saved: report.saved.len(),
                failed: report.failed.len(),
            });
        }
        Ok(report)
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|err| SaveError::Format(format!("serialize payload: {}", err)))
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SaveError::InvalidKey("key must not be empty".to_string()));
    }
    if key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(SaveError::InvalidKey(format!(
            "key must not contain path separators: '{}'",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation_rejects_path_escapes() {
        assert!(validate_key("profile").is_ok());
        assert!(validate_key("profile_2").is_ok());
        assert!(matches!(validate_key(""), Err(SaveError::InvalidKey(_))));
        assert!(matches!(
            validate_key("../profile"),
            Err(SaveError::InvalidKey(_))
        ));
        assert!(matches!(
            validate_key("nested/profile"),
            Err(SaveError::InvalidKey(_))
        ));
    }
}
