//! Periodic expiry sweep: lifts mutes whose term has run out.

use crate::enforcement::{Enforcement, Restriction};
use crate::ledger::Ledger;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Runs one sweep at `now`. Returns how many mutes were lifted on the platform.
pub async fn sweep_once(ledger: &Ledger, enforcer: &dyn Enforcement, now: DateTime<Utc>) -> usize {
    if let Err(e) = ledger.flush() {
        warn!("ledger flush failed: {:?}", e);
    }

    let expired = ledger.sweep_expired(now);
    let mut lifted = 0;
    for record in expired {
        match enforcer
            .apply(record.chat, record.subject, Restriction::LiftMute)
            .await
        {
            Ok(()) => {
                info!(
                    "mute expired: user {} in chat {} (reason: {})",
                    record.subject, record.chat, record.reason
                );
                lifted += 1;
            }
            Err(e) => warn!(
                "failed to lift expired mute for user {} in chat {}: {}",
                record.subject, record.chat, e
            ),
        }
    }
    lifted
}

pub async fn run_sweeper(
    ledger: Arc<Ledger>,
    enforcer: Arc<dyn Enforcement>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("expiry sweeper started, interval {:?}", every);
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.recv() => { break; }
            _ = ticker.tick() => {
                sweep_once(&ledger, enforcer.as_ref(), Utc::now()).await;
            }
        }
    }
    info!("expiry sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnforcementError;
    use crate::ledger::{PunishmentKind, PunishmentRecord};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use teloxide::types::{ChatId, UserId};

    #[derive(Default)]
    struct Recorder {
        lifted: Mutex<Vec<UserId>>,
        refuse: Option<UserId>,
    }

    #[async_trait]
    impl Enforcement for Recorder {
        async fn apply(
            &self,
            _chat: ChatId,
            user: UserId,
            restriction: Restriction,
        ) -> Result<(), EnforcementError> {
            assert_eq!(restriction, Restriction::LiftMute);
            if self.refuse == Some(user) {
                return Err(EnforcementError::Transient("timeout".into()));
            }
            self.lifted.lock().unwrap().push(user);
            Ok(())
        }
    }

    fn mute(user: u64, expires_at: DateTime<Utc>) -> PunishmentRecord {
        PunishmentRecord {
            subject: UserId(user),
            chat: ChatId(-5),
            kind: PunishmentKind::Mute,
            expires_at: Some(expires_at),
            reason: "флуд".into(),
            issued_by: "@mod".into(),
            issued_at: expires_at - chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_sweep_once_lifts_expired_mutes() {
        let ledger = Ledger::open(Arc::new(MemoryStore::new())).unwrap();
        let now = Utc::now();
        ledger.upsert(mute(1, now - chrono::Duration::seconds(1))).unwrap();
        ledger.upsert(mute(2, now + chrono::Duration::hours(1))).unwrap();

        let recorder = Recorder::default();
        assert_eq!(sweep_once(&ledger, &recorder, now).await, 1);
        assert_eq!(recorder.lifted.lock().unwrap().as_slice(), &[UserId(1)]);
        assert_eq!(sweep_once(&ledger, &recorder, now).await, 0);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lift_is_not_retried() {
        let ledger = Ledger::open(Arc::new(MemoryStore::new())).unwrap();
        let now = Utc::now();
        ledger.upsert(mute(1, now)).unwrap();
        ledger.upsert(mute(2, now)).unwrap();

        let recorder = Recorder {
            refuse: Some(UserId(2)),
            ..Recorder::default()
        };
        assert_eq!(sweep_once(&ledger, &recorder, now).await, 1);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_flushes_dirty_ledger() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::open(store.clone()).unwrap();
        store.set_available(false);
        let _ = ledger.upsert(mute(1, Utc::now() + chrono::Duration::hours(1)));
        assert!(ledger.is_dirty());

        store.set_available(true);
        sweep_once(&ledger, &Recorder::default(), Utc::now()).await;
        assert!(!ledger.is_dirty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_run_sweeper_stops_on_shutdown() {
        let ledger = Arc::new(Ledger::open(Arc::new(MemoryStore::new())).unwrap());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_sweeper(
            ledger,
            Arc::new(Recorder::default()),
            Duration::from_millis(10),
            rx,
        ));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
