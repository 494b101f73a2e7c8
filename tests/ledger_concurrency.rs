use chrono::{Duration, Utc};
use std::sync::{Arc, Barrier};
use std::thread;
use teloxide::types::{ChatId, UserId};
use tg_moderator::store::{JsonFileStore, MemoryStore, RecordStore};
use tg_moderator::{Ledger, PunishmentKind, PunishmentRecord};

const CHAT: ChatId = ChatId(-100123);

fn record(user: u64, kind: PunishmentKind, reason: &str) -> PunishmentRecord {
    PunishmentRecord {
        subject: UserId(user),
        chat: CHAT,
        kind,
        expires_at: None,
        reason: reason.to_string(),
        issued_by: "@mod".to_string(),
        issued_at: Utc::now(),
    }
}

#[test]
fn upsert_and_clear_on_same_key_linearize() {
    for round in 0..200 {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::open(store.clone()).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let muter = {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ledger.upsert(record(1, PunishmentKind::Mute, "flood")).unwrap();
            })
        };
        let unmuter = {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ledger.clear(UserId(1), CHAT).unwrap()
            })
        };
        muter.join().unwrap();
        let cleared = unmuter.join().unwrap();

        let state = ledger.lookup(UserId(1), CHAT);
        // upsert then clear: empty and clear saw the record
        // clear then upsert: record present and clear saw nothing
        assert_eq!(state.is_none(), cleared, "round {round}");
        assert_eq!(store.snapshot().len(), ledger.len(), "round {round}");
    }
}

#[test]
fn different_keys_do_not_interfere() {
    let ledger = Arc::new(Ledger::open(Arc::new(MemoryStore::new())).unwrap());
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for i in 0..50u64 {
                    let user = t * 1000 + i;
                    ledger.upsert(record(user, PunishmentKind::Ban, "spam")).unwrap();
                    if i % 2 == 0 {
                        assert!(ledger.clear(UserId(user), CHAT).unwrap());
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(ledger.len(), 8 * 25);
}

#[test]
fn sweep_races_with_renewal() {
    let now = Utc::now();
    for _ in 0..200 {
        let ledger = Arc::new(Ledger::open(Arc::new(MemoryStore::new())).unwrap());
        let mut old = record(1, PunishmentKind::Mute, "old");
        old.expires_at = Some(now - Duration::minutes(1));
        ledger.upsert(old).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let sweeper = {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ledger.sweep_expired(now)
            })
        };
        let renewer = {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut renewed = record(1, PunishmentKind::Mute, "renewed");
                renewed.expires_at = Some(now + Duration::hours(1));
                ledger.upsert(renewed).unwrap();
            })
        };
        let swept = sweeper.join().unwrap();
        renewer.join().unwrap();

        assert!(swept.iter().all(|r| r.reason == "old"));
        assert_eq!(ledger.lookup(UserId(1), CHAT).unwrap().reason, "renewed");
    }
}

#[test]
fn ledger_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = Ledger::open(Arc::new(JsonFileStore::in_dir(dir.path()))).unwrap();
        ledger.upsert(record(1, PunishmentKind::Mute, "flood")).unwrap();
        ledger.upsert(record(2, PunishmentKind::Ban, "ads")).unwrap();
        ledger.clear(UserId(1), CHAT).unwrap();
    }

    let store = JsonFileStore::in_dir(dir.path());
    assert_eq!(store.load().unwrap().len(), 1);
    let ledger = Ledger::open(Arc::new(store)).unwrap();
    let ban = ledger.lookup(UserId(2), CHAT).unwrap();
    assert_eq!(ban.kind, PunishmentKind::Ban);
    assert_eq!(ban.reason, "ads");
    assert!(ledger.lookup(UserId(1), CHAT).is_none());
}
