//! Dirty-key tracking and the background auto-save flush loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::warn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::error::Result;
use crate::store::StoreCore;

/// Snapshot of one unsaved change; last write before a flush wins.
#[derive(Debug, Clone)]
pub struct DirtyEntry {
    pub key: String,
    pub type_tag: String,
    pub payload: serde_json::Value,
    pub marked_at: DateTime<Utc>,
}

/// Keys with unsaved changes, shared between foreground callers and the
/// auto-save worker.
#[derive(Debug, Default)]
pub struct DirtyKeyTracker {
    entries: Mutex<HashMap<String, DirtyEntry>>,
}

impl DirtyKeyTracker {
    pub fn mark_dirty(
        &self,
        key: &str,
        type_tag: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let entry = DirtyEntry {
            key: key.to_string(),
            type_tag: type_tag.into(),
            payload,
            marked_at: Utc::now(),
        };
        self.entries.lock()?.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn clear(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock()?.remove(key).is_some())
    }

    /// Clears `key` only if it has not been re-marked since `marked_at`;
    /// a newer snapshot stays dirty for the next flush cycle.
    pub fn clear_if_unmodified(&self, key: &str, marked_at: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.entries.lock()?;
        if entries
            .get(key)
            .is_some_and(|entry| entry.marked_at == marked_at)
        {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn snapshot(&self) -> Result<Vec<DirtyEntry>> {
        Ok(self.entries.lock()?.values().cloned().collect())
    }

    pub fn dirty_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock()?.keys().cloned().collect())
    }

    pub fn is_dirty(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock()?.contains_key(key))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.lock()?.is_empty())
    }
}

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

impl FlushReport {
    pub fn all_saved(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }
}

/// Background flush loop handle: Running until stopped or dropped.
///
/// The loop is cooperative; a long flush delays the next cycle rather than
/// overlapping with it.
pub struct AutoSaveWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl AutoSaveWorker {
    /// Signals the loop to stop and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            if let Err(err) = join_handle.await {
                warn!("auto-save worker join: {}", err);
            }
        }
    }
}

impl Drop for AutoSaveWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the recurring flush loop for the given store core.
///
/// Per-cycle errors are logged and never terminate the loop.
pub(crate) fn spawn_auto_save_worker(core: Arc<StoreCore>, interval_ms: u64) -> AutoSaveWorker {
    let interval_ms = interval_ms.max(10);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = sleep(Duration::from_millis(interval_ms)) => {
                    match core.flush_dirty().await {
                        Ok(report) if !report.failed.is_empty() => {
                            warn!(
                                "auto-save flush: {} saved, {} still dirty",
                                report.saved.len(),
                                report.failed.len()
                            );
                        }
                        Ok(_) => {}
                        Err(err) => warn!("auto-save flush cycle: {}", err),
                    }
                }
            }
        }
    });

    AutoSaveWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
