//! Backup-before-overwrite and retention rotation.
//!
//! Ordering invariant: the backup copy completes before the store touches
//! the original file. Rotation keeps the newest `max_backups` copies per
//! save file, ordered by creation time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use log::debug;
use tokio::fs;

use crate::error::{Result, SaveError};

pub const BACKUP_DIR: &str = "Backups";
const BACKUP_SUFFIX: &str = "backup";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy)]
pub struct BackupRotator {
    enabled: bool,
    max_backups: usize,
}

impl BackupRotator {
    pub fn new(enabled: bool, max_backups: usize) -> Self {
        Self {
            enabled,
            max_backups,
        }
    }

    /// Copies `path` into the backup directory if it exists, then rotates.
    ///
    /// Returns the backup path when a copy was made. Failures here are
    /// reported to the caller, which treats them as non-fatal to the save.
    pub async fn backup_if_exists(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        match fs::metadata(path).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SaveError::Io(err.to_string())),
        }

        let parent = path
            .parent()
            .ok_or_else(|| SaveError::Io(format!("no parent directory for {}", path.display())))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| SaveError::Io(format!("no file name in {}", path.display())))?
            .to_string_lossy()
            .to_string();

        let backups_dir = parent.join(BACKUP_DIR);
        fs::create_dir_all(&backups_dir)
            .await
            .map_err(|err| SaveError::Io(err.to_string()))?;

        let backup_path = self
            .unique_backup_path(&backups_dir, &file_name)
            .await?;
        fs::copy(path, &backup_path)
            .await
            .map_err(|err| SaveError::Io(err.to_string()))?;
        debug!("backed up {} to {}", path.display(), backup_path.display());

        self.rotate(&backups_dir, &file_name).await?;
        Ok(Some(backup_path))
    }

    /// Deletes the oldest backups for `file_name` beyond `max_backups`.
    ///
    /// Returns how many files were removed.
    pub async fn rotate(&self, backups_dir: &Path, file_name: &str) -> Result<usize> {
        let mut backups = list_backups(backups_dir, file_name).await?;
        if backups.len() <= self.max_backups {
            return Ok(0);
        }

        // Newest first; creation-time ties break on the disambiguated name.
        backups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        let mut removed = 0;
        for (path, _) in backups.drain(self.max_backups..) {
            fs::remove_file(&path)
                .await
                .map_err(|err| SaveError::Io(err.to_string()))?;
            removed += 1;
        }
        Ok(removed)
    }

    // Same-second saves would collide on the timestamp alone, so a numeric
    // suffix disambiguates.
    async fn unique_backup_path(&self, backups_dir: &Path, file_name: &str) -> Result<PathBuf> {
        let stamp = Utc::now().format(TIMESTAMP_FORMAT);
        let base = backups_dir.join(format!("{}.{}.{}", file_name, stamp, BACKUP_SUFFIX));
        if !path_exists(&base).await? {
            return Ok(base);
        }
        for n in 1..u32::MAX {
            let candidate =
                backups_dir.join(format!("{}.{}_{}.{}", file_name, stamp, n, BACKUP_SUFFIX));
            if !path_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(SaveError::Io("backup name space exhausted".to_string()))
    }
}

async fn path_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(SaveError::Io(err.to_string())),
    }
}

/// Backups belonging to one save file, paired with their creation time.
async fn list_backups(backups_dir: &Path, file_name: &str) -> Result<Vec<(PathBuf, SystemTime)>> {
    let prefix = format!("{}.", file_name);
    let suffix = format!(".{}", BACKUP_SUFFIX);

    let mut entries = match fs::read_dir(backups_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SaveError::Io(err.to_string())),
    };

    let mut backups = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| SaveError::Io(err.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(&prefix) || !name.ends_with(&suffix) {
            continue;
        }
        let meta = entry
            .metadata()
            .await
            .map_err(|err| SaveError::Io(err.to_string()))?;
        let created = meta.created().or_else(|_| meta.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
        backups.push((entry.path(), created));
    }
    Ok(backups)
}

/// Current backup count for one save file.
pub async fn backup_count(backups_dir: &Path, file_name: &str) -> Result<usize> {
    Ok(list_backups(backups_dir, file_name).await?.len())
}
