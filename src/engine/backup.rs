//! Pre-Push Script Backups
//!
//! Append-only snapshots of a bot script, taken before it is overwritten.
//!
//! Each capture writes one file named `bot_{target}_backup_{YYYYMMDD_HHMMSS}.dlz`.
//! Two captures for the same target within the same second never overwrite
//! each other: the second one gets a `_2` suffix, the third `_3`, and so on.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "bot_";
const BACKUP_MARKER: &str = "_backup_";
const EXTENSION: &str = "dlz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_SAME_SECOND_CAPTURES: u32 = 1000;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid backup target: {0:?}")]
    InvalidTarget(String),
    #[error("Failed to create backup directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write backup {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to read backup {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Too many backups for {0} within one second")]
    Exhausted(String),
}

/// A durable snapshot of one script
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackupRecord {
    pub target_id: String,
    pub captured_at: DateTime<Local>,
    pub path: PathBuf,
    /// Captured content, kept in memory so rollback never re-reads disk
    #[serde(skip_serializing)]
    pub content: String,
    pub size: u64,
    /// SHA-256 of the content, hex encoded
    pub checksum: String,
}

/// Backup listing entry, parsed from a file name
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackupEntry {
    pub target_id: String,
    pub captured_at: DateTime<Local>,
    pub path: PathBuf,
    pub size: u64,
}

/// The backup store
pub struct BackupStore {
    backup_dir: PathBuf,
}

impl BackupStore {
    /// Open the store, creating the directory if absent
    pub fn open(backup_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(backup_dir).map_err(|source| StorageError::CreateDir {
            path: backup_dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            backup_dir: backup_dir.to_path_buf(),
        })
    }

    /// Snapshot `content` for `target_id`.
    ///
    /// The file is synced to disk before this returns.
    pub fn capture(&self, target_id: &str, content: &str) -> Result<BackupRecord, StorageError> {
        validate_target(target_id)?;

        let captured_at = Local::now();
        let stem = format!(
            "{}{}{}{}",
            FILE_PREFIX,
            target_id,
            BACKUP_MARKER,
            captured_at.format(TIMESTAMP_FORMAT)
        );

        for attempt in 1..=MAX_SAME_SECOND_CAPTURES {
            let name = if attempt == 1 {
                format!("{}.{}", stem, EXTENSION)
            } else {
                format!("{}_{}.{}", stem, attempt, EXTENSION)
            };
            let path = self.backup_dir.join(name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Backup name taken, trying next suffix");
                    continue;
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            let written = file.write_all(content.as_bytes()).and_then(|_| file.sync_all());
            drop(file);
            discard_on_error(&path, written)?;

            info!(target_id, path = %path.display(), bytes = content.len(), "Backup created");

            return Ok(BackupRecord {
                target_id: target_id.to_string(),
                captured_at,
                path,
                content: content.to_string(),
                size: content.len() as u64,
                checksum: checksum(content.as_bytes()),
            });
        }

        Err(StorageError::Exhausted(target_id.to_string()))
    }

    /// List backups for a target, newest first
    pub fn list(&self, target_id: &str) -> Result<Vec<BackupEntry>, StorageError> {
        validate_target(target_id)?;

        let mut entries = Vec::new();
        let read_dir = fs::read_dir(&self.backup_dir).map_err(|source| StorageError::Read {
            path: self.backup_dir.clone(),
            source,
        })?;

        for entry in read_dir {
            let entry = entry.map_err(|source| StorageError::Read {
                path: self.backup_dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((target, captured_at)) = parse_backup_name(name) else {
                continue;
            };
            if target != target_id {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(BackupEntry {
                target_id: target,
                captured_at,
                path,
                size,
            });
        }

        // Same-second suffixes sort by name
        entries.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(entries)
    }

    /// Read a stored snapshot back from disk
    pub fn read(&self, path: &Path) -> Result<String, StorageError> {
        fs::read_to_string(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check a record's file still matches its checksum
    pub fn verify(&self, record: &BackupRecord) -> Result<bool, StorageError> {
        let bytes = fs::read(&record.path).map_err(|source| StorageError::Read {
            path: record.path.clone(),
            source,
        })?;
        Ok(checksum(&bytes) == record.checksum)
    }
}

fn validate_target(target_id: &str) -> Result<(), StorageError> {
    if target_id.is_empty()
        || target_id.contains('/')
        || target_id.contains('\\')
        || target_id.contains("..")
    {
        return Err(StorageError::InvalidTarget(target_id.to_string()));
    }
    Ok(())
}

/// Remove a snapshot whose write failed, so a truncated file never keeps a
/// valid backup name
fn discard_on_error(path: &Path, written: io::Result<()>) -> Result<(), StorageError> {
    let Err(source) = written else {
        return Ok(());
    };
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), "Failed to remove partial backup: {}", e);
    }
    Err(StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Split `bot_{target}_backup_{timestamp}[_n].dlz` into target and time
fn parse_backup_name(name: &str) -> Option<(String, DateTime<Local>)> {
    let stem = name.strip_suffix(&format!(".{}", EXTENSION))?;
    let rest = stem.strip_prefix(FILE_PREFIX)?;
    let marker = rest.rfind(BACKUP_MARKER)?;
    let target = &rest[..marker];
    let stamp = &rest[marker + BACKUP_MARKER.len()..];

    if target.is_empty() {
        return None;
    }

    // YYYYMMDD_HHMMSS is 15 bytes, optionally followed by `_<n>`
    let timestamp = stamp.get(..15)?;
    let suffix = stamp.get(15..)?;
    if !suffix.is_empty() {
        let digits = suffix.strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    let captured_at = Local.from_local_datetime(&naive).earliest()?;
    Some((target.to_string(), captured_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempdir().unwrap();
        let backup_dir = dir.path().join("backups");

        BackupStore::open(&backup_dir).unwrap();
        BackupStore::open(&backup_dir).unwrap();
        assert!(backup_dir.is_dir());
    }

    #[test]
    fn test_capture_writes_content() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        let record = store.capture("4242", "OLD").unwrap();

        assert_eq!(fs::read_to_string(&record.path).unwrap(), "OLD");
        assert_eq!(record.content, "OLD");
        assert_eq!(record.size, 3);
        let name = record.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("bot_4242_backup_"));
        assert!(name.ends_with(".dlz"));
        assert!(store.verify(&record).unwrap());
    }

    #[test]
    fn test_same_second_captures_never_overwrite() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        let records: Vec<_> = (0..3)
            .map(|i| store.capture("bot", &format!("v{}", i)).unwrap())
            .collect();

        for (i, record) in records.iter().enumerate() {
            assert_eq!(store.read(&record.path).unwrap(), format!("v{}", i));
        }
        assert_eq!(store.list("bot").unwrap().len(), 3);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        for target in ["", "../etc", "a/b", "a\\b"] {
            assert!(matches!(
                store.capture(target, "x"),
                Err(StorageError::InvalidTarget(_))
            ));
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_list_filters_by_target() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        store.capture("alpha", "a").unwrap();
        store.capture("alpha_backup_x", "b").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let alpha = store.list("alpha").unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].target_id, "alpha");
        assert_eq!(store.list("alpha_backup_x").unwrap().len(), 1);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        let record = store.capture("bot", "original").unwrap();
        fs::write(&record.path, "edited").unwrap();

        assert!(!store.verify(&record).unwrap());
    }

    #[test]
    fn test_parse_backup_name() {
        let (target, at) = parse_backup_name("bot_99_backup_20240102_030405_2.dlz").unwrap();
        assert_eq!(target, "99");
        assert_eq!(at.format(TIMESTAMP_FORMAT).to_string(), "20240102_030405");

        assert!(parse_backup_name("bot_99_backup_garbage.dlz").is_none());
        assert!(parse_backup_name("bot_1_backup_20240102_030405junk.dlz").is_none());
        assert!(parse_backup_name("bot_1_backup_20240102_030405_.dlz").is_none());
        assert!(parse_backup_name("bot_1_backup_20240102_030405_x1.dlz").is_none());
        assert!(parse_backup_name("bot_1_backup_20240102_030405_12.dlz").is_some());
        assert!(parse_backup_name("bot_99_backup_20240102_030405.txt").is_none());
    }

    #[test]
    fn test_list_skips_names_with_multibyte_timestamps() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();

        store.capture("1", "kept").unwrap();
        fs::write(dir.path().join("bot_1_backup_20240102_03040é.dlz"), "x").unwrap();
        fs::write(dir.path().join("bot_1_backup_2024é.dlz"), "x").unwrap();

        let entries = store.list("1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.read(&entries[0].path).unwrap(), "kept");
    }

    #[test]
    fn test_failed_write_leaves_no_partial_backup() {
        let dir = tempdir().unwrap();
        let store = BackupStore::open(dir.path()).unwrap();
        let partial = dir.path().join("bot_1_backup_20240102_030405.dlz");
        fs::write(&partial, "trunc").unwrap();

        let err = discard_on_error(
            &partial,
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device")),
        )
        .unwrap_err();

        assert!(matches!(err, StorageError::Write { .. }));
        assert!(!partial.exists());
        assert!(store.list("1").unwrap().is_empty());
        assert!(discard_on_error(&partial, Ok(())).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_fails_on_file_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("backups");
        fs::write(&blocker, "not a dir").unwrap();

        assert!(matches!(
            BackupStore::open(&blocker),
            Err(StorageError::CreateDir { .. })
        ));
    }
}
