//! Schema-version migration chain.
//!
//! Handlers are keyed by the version they upgrade *to*; a record at version
//! N is walked through the handlers for N+1, N+2, ... strictly in ascending
//! order until it reaches the current version or no handler exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;

use crate::error::{Result, SaveError};
use crate::record::SaveRecord;

/// Upgrades a payload from `target_version - 1` to `target_version`.
pub type MigrationHandler =
    Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MigrationChain {
    handlers: BTreeMap<u32, MigrationHandler>,
}

impl MigrationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler that upgrades payloads to `target_version`.
    ///
    /// `target_version` must be at least 2; version 1 is the floor and has
    /// nothing to upgrade from.
    pub fn register(&mut self, target_version: u32, handler: MigrationHandler) {
        if target_version < 2 {
            warn!(
                "ignoring migration handler for version {}; the chain starts at 2",
                target_version
            );
            return;
        }
        self.handlers.insert(target_version, handler);
    }

    pub fn register_fn<F>(&mut self, target_version: u32, handler: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.register(target_version, Arc::new(handler));
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Walks `record` up to `current_version`, applying handlers in order.
    ///
    /// If the chain runs out before reaching `current_version` the record
    /// keeps the version it reached and a migration error is returned.
    pub fn upgrade(&self, record: &mut SaveRecord, current_version: u32) -> Result<()> {
        while record.version < current_version {
            let next = record.version + 1;
            let Some(handler) = self.handlers.get(&next) else {
                break;
            };
            record.payload = handler(record.payload.clone())?;
            record.version = next;
        }

        if record.version != current_version {
            return Err(SaveError::Migration(format!(
                "no upgrade path for '{}' from version {} to {}",
                record.key, record.version, current_version
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MigrationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationChain")
            .field("target_versions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
