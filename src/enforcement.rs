use crate::error::EnforcementError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    /// Read-only until the given moment; `None` keeps it until lifted.
    Mute { until: Option<DateTime<Utc>> },
    Ban,
    LiftMute,
    LiftBan,
}

/// Applies restrictions on the messaging platform.
#[async_trait]
pub trait Enforcement: Send + Sync {
    async fn apply(
        &self,
        chat: ChatId,
        user: UserId,
        restriction: Restriction,
    ) -> Result<(), EnforcementError>;
}
