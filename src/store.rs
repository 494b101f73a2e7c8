//! Backing stores for the punishment ledger.
//!
//! The ledger persists whole snapshots, so a store only has to load and save
//! a flat list of records.

use crate::error::StorageError;
use crate::ledger::{PunishmentKind, PunishmentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use teloxide::types::{ChatId, UserId};

pub const LEDGER_FILE_NAME: &str = "punishments.json";
const TEMP_FILE_SUFFIX: &str = ".tmp";

pub trait RecordStore: Send + Sync {
    fn load(&self) -> Result<Vec<PunishmentRecord>, StorageError>;
    fn save(&self, records: &[PunishmentRecord]) -> Result<(), StorageError>;
}

/// Volatile store for tests. `set_available(false)` makes every call fail.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PunishmentRecord>>,
    unavailable: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PunishmentRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Last saved snapshot.
    pub fn snapshot(&self) -> Vec<PunishmentRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<Vec<PunishmentRecord>, StorageError> {
        self.check()?;
        Ok(self.snapshot())
    }

    fn save(&self, records: &[PunishmentRecord]) -> Result<(), StorageError> {
        self.check()?;
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistRecord {
    chat_id: i64,
    user_id: u64,
    kind: PunishmentKind,
    expires_at: Option<DateTime<Utc>>,
    reason: String,
    issued_by: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistSnapshot {
    records: Vec<PersistRecord>,
    saved_at: DateTime<Utc>,
}

impl From<&PunishmentRecord> for PersistRecord {
    fn from(r: &PunishmentRecord) -> Self {
        Self {
            chat_id: r.chat.0,
            user_id: r.subject.0,
            kind: r.kind,
            expires_at: r.expires_at,
            reason: r.reason.clone(),
            issued_by: r.issued_by.clone(),
            issued_at: r.issued_at,
        }
    }
}

impl From<PersistRecord> for PunishmentRecord {
    fn from(p: PersistRecord) -> Self {
        Self {
            subject: UserId(p.user_id),
            chat: ChatId(p.chat_id),
            kind: p.kind,
            expires_at: p.expires_at,
            reason: p.reason,
            issued_by: p.issued_by,
            issued_at: p.issued_at,
        }
    }
}

/// Single JSON snapshot file, replaced atomically on every save.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(LEDGER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> Result<Vec<PunishmentRecord>, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let snap: PersistSnapshot = serde_json::from_str(&text)?;
        Ok(snap.records.into_iter().map(PunishmentRecord::from).collect())
    }

    fn save(&self, records: &[PunishmentRecord]) -> Result<(), StorageError> {
        let snap = PersistSnapshot {
            records: records.iter().map(PersistRecord::from).collect(),
            saved_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&snap)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

/// Writes next to `path` and renames over it, so readers never see a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TEMP_FILE_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}
