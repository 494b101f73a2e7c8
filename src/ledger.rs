//! Punishment ledger: the single active sanction per `(user, chat)`.
//!
//! Records live in a sharded concurrent map, so operations on one key are
//! atomic with respect to each other while different keys never contend.
//! Every mutation is followed by a full snapshot write to the backing
//! [`RecordStore`]; snapshot writes are serialized so an older snapshot can
//! never land after a newer one.

use crate::error::StorageError;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use teloxide::types::{ChatId, UserId};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    Mute,
    Ban,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentRecord {
    pub subject: UserId,
    pub chat: ChatId,
    pub kind: PunishmentKind,
    /// `None` means indefinite.
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}

impl PunishmentRecord {
    fn key(&self) -> LedgerKey {
        (self.chat, self.subject)
    }

    /// Only timed mutes expire; bans stay until lifted explicitly.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.kind == PunishmentKind::Mute && self.expires_at.is_some_and(|at| at <= now)
    }
}

type LedgerKey = (ChatId, UserId);

pub struct Ledger {
    records: DashMap<LedgerKey, PunishmentRecord>,
    store: Arc<dyn RecordStore>,
    persist_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl Ledger {
    /// Loads the persisted snapshot. Later duplicates of a key replace earlier ones.
    pub fn open(store: Arc<dyn RecordStore>) -> Result<Self, StorageError> {
        let records = DashMap::new();
        for r in store.load()? {
            records.insert(r.key(), r);
        }
        Ok(Self {
            records,
            store,
            persist_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    /// Replaces whatever record the subject had in that chat.
    ///
    /// The in-memory state changes even if persisting fails; the error is
    /// returned and the ledger stays dirty until a later write succeeds.
    pub fn upsert(&self, record: PunishmentRecord) -> Result<(), StorageError> {
        let key = record.key();
        if let Some(prev) = self.records.insert(key, record) {
            debug!(
                "ledger: replaced {:?} for user {} in chat {}",
                prev.kind, key.1, key.0
            );
        }
        self.persist()
    }

    /// Returns whether a record existed. Absent keys do not touch storage.
    pub fn clear(&self, subject: UserId, chat: ChatId) -> Result<bool, StorageError> {
        self.remove_if(subject, chat, |_| true)
    }

    /// Like [`Ledger::clear`], but only drops a record of the given kind.
    ///
    /// The kind is checked under the shard lock, so a record of another kind,
    /// or one replaced concurrently by a different kind, is left in place.
    pub fn clear_kind(
        &self,
        subject: UserId,
        chat: ChatId,
        kind: PunishmentKind,
    ) -> Result<bool, StorageError> {
        self.remove_if(subject, chat, |r| r.kind == kind)
    }

    fn remove_if(
        &self,
        subject: UserId,
        chat: ChatId,
        pred: impl FnOnce(&PunishmentRecord) -> bool,
    ) -> Result<bool, StorageError> {
        if self
            .records
            .remove_if(&(chat, subject), |_, r| pred(r))
            .is_none()
        {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn lookup(&self, subject: UserId, chat: ChatId) -> Option<PunishmentRecord> {
        self.records.get(&(chat, subject)).map(|r| r.value().clone())
    }

    /// Removes and returns every mute with `expires_at <= now`.
    ///
    /// Each key is re-checked under its shard lock while being removed, so a
    /// record replaced concurrently with a later expiry survives.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<PunishmentRecord> {
        let candidates: Vec<LedgerKey> = self
            .records
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| *e.key())
            .collect();

        let mut expired = Vec::with_capacity(candidates.len());
        for key in candidates {
            if let Some((_, r)) = self.records.remove_if(&key, |_, r| r.is_expired(now)) {
                expired.push(r);
            }
        }

        if !expired.is_empty() {
            if let Err(e) = self.persist() {
                warn!("ledger: persist after sweep failed: {:?}", e);
            }
        }
        expired
    }

    /// Writes the current state if an earlier write failed.
    pub fn flush(&self) -> Result<(), StorageError> {
        if !self.is_dirty() {
            return Ok(());
        }
        self.persist()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<PunishmentRecord> =
            self.records.iter().map(|e| e.value().clone()).collect();
        snapshot.sort_by_key(|r| (r.chat.0, r.subject.0));

        match self.store.save(&snapshot) {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    const CHAT: ChatId = ChatId(-1001);

    fn mute(user: u64, expires_at: Option<DateTime<Utc>>, reason: &str) -> PunishmentRecord {
        PunishmentRecord {
            subject: UserId(user),
            chat: CHAT,
            kind: PunishmentKind::Mute,
            expires_at,
            reason: reason.into(),
            issued_by: "@mod".into(),
            issued_at: Utc::now(),
        }
    }

    fn ban(user: u64, expires_at: Option<DateTime<Utc>>) -> PunishmentRecord {
        PunishmentRecord {
            kind: PunishmentKind::Ban,
            ..mute(user, expires_at, "реклама")
        }
    }

    fn ledger() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::open(store.clone()).unwrap();
        (store, ledger)
    }

    #[test]
    fn test_upsert_replaces_prior_record() {
        let (store, ledger) = ledger();
        let a = mute(7, None, "флуд");
        let b = ban(7, None);
        ledger.upsert(a).unwrap();
        ledger.upsert(b.clone()).unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.lookup(UserId(7), CHAT), Some(b.clone()));
        assert_eq!(store.snapshot(), vec![b]);
    }

    #[test]
    fn test_records_are_scoped_per_chat() {
        let (_, ledger) = ledger();
        ledger.upsert(mute(7, None, "x")).unwrap();
        ledger
            .upsert(PunishmentRecord {
                chat: ChatId(-2002),
                ..mute(7, None, "y")
            })
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.lookup(UserId(7), CHAT).unwrap().reason, "x");
        assert_eq!(ledger.lookup(UserId(7), ChatId(-2002)).unwrap().reason, "y");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, ledger) = ledger();
        ledger.upsert(mute(1, None, "x")).unwrap();
        assert!(ledger.clear(UserId(1), CHAT).unwrap());
        let saves = store.save_count();

        assert!(!ledger.clear(UserId(1), CHAT).unwrap());
        assert!(ledger.lookup(UserId(1), CHAT).is_none());
        assert_eq!(store.save_count(), saves);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_clear_kind_leaves_other_kind() {
        let (store, ledger) = ledger();
        ledger.upsert(mute(3, None, "флуд")).unwrap();
        let saves = store.save_count();

        assert!(!ledger.clear_kind(UserId(3), CHAT, PunishmentKind::Ban).unwrap());
        assert_eq!(ledger.lookup(UserId(3), CHAT).unwrap().kind, PunishmentKind::Mute);
        assert_eq!(store.save_count(), saves);

        assert!(ledger.clear_kind(UserId(3), CHAT, PunishmentKind::Mute).unwrap());
        assert!(ledger.lookup(UserId(3), CHAT).is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_sweep_expired() {
        let (store, ledger) = ledger();
        let now = Utc::now();
        ledger.upsert(mute(1, Some(now - Duration::minutes(1)), "old")).unwrap();
        ledger.upsert(mute(2, Some(now), "edge")).unwrap();
        ledger.upsert(mute(3, Some(now + Duration::minutes(5)), "new")).unwrap();
        ledger.upsert(mute(4, None, "forever")).unwrap();
        ledger.upsert(ban(5, Some(now - Duration::days(1)))).unwrap();

        let mut swept: Vec<u64> = ledger.sweep_expired(now).iter().map(|r| r.subject.0).collect();
        swept.sort();
        assert_eq!(swept, vec![1, 2]);

        assert!(ledger.sweep_expired(now).is_empty());
        assert!(ledger.lookup(UserId(1), CHAT).is_none());
        assert!(ledger.lookup(UserId(3), CHAT).is_some());
        assert!(ledger.lookup(UserId(4), CHAT).is_some());
        assert!(ledger.lookup(UserId(5), CHAT).is_some());
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn test_reupsert_after_snapshot_survives_sweep() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        ledger.upsert(mute(1, Some(now - Duration::minutes(1)), "old")).unwrap();
        ledger.upsert(mute(1, Some(now + Duration::hours(1)), "renewed")).unwrap();

        assert!(ledger.sweep_expired(now).is_empty());
        assert_eq!(ledger.lookup(UserId(1), CHAT).unwrap().reason, "renewed");
    }

    #[test]
    fn test_storage_failure_keeps_intent() {
        let (store, ledger) = ledger();
        store.set_available(false);

        let err = ledger.upsert(mute(9, None, "x")).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(ledger.lookup(UserId(9), CHAT).is_some());
        assert!(ledger.is_dirty());
        assert!(ledger.flush().is_err());

        store.set_available(true);
        ledger.flush().unwrap();
        assert!(!ledger.is_dirty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_open_restores_snapshot() {
        let store = Arc::new(MemoryStore::with_records(vec![
            mute(1, None, "first"),
            mute(1, None, "second"),
            ban(2, None),
        ]));
        let ledger = Ledger::open(store).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.lookup(UserId(1), CHAT).unwrap().reason, "second");
    }

    #[test]
    fn test_open_fails_when_store_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        assert!(Ledger::open(store).is_err());
    }
}
