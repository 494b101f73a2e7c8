//! User and admin lookups used by the moderator.

use crate::error::DirectoryError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use teloxide::types::{ChatId, User, UserId};
use tracing::{debug, warn};

/// A chat member as the moderator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    /// `@username` when known, otherwise the first name.
    pub display: String,
    pub is_bot: bool,
}

impl Participant {
    pub fn new(id: UserId, display: impl Into<String>) -> Self {
        Self {
            id,
            display: display.into(),
            is_bot: false,
        }
    }
}

impl From<&User> for Participant {
    fn from(u: &User) -> Self {
        let display = match u.username.as_deref() {
            Some(name) => format!("@{}", name),
            None => u.first_name.clone(),
        };
        Self {
            id: u.id,
            display,
            is_bot: u.is_bot,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves `handle` (without `@`) to a member of `chat`.
    async fn resolve(&self, chat: ChatId, handle: &str) -> Result<Participant, DirectoryError>;
}

/// Username directory learned from traffic.
///
/// The Bot API has no "find member by username" call, so every message the
/// bot sees teaches it who is behind a handle in that chat.
#[derive(Default)]
pub struct SeenUsers {
    by_handle: DashMap<(ChatId, String), Participant>,
}

impl SeenUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, chat: ChatId, user: &User) {
        let Some(username) = user.username.as_deref() else {
            return;
        };
        self.by_handle
            .insert((chat, username.to_lowercase()), Participant::from(user));
    }

    /// Drops every handle learned in `chat`, returning how many went.
    pub fn forget_chat(&self, chat: ChatId) -> usize {
        let mut dropped = 0;
        self.by_handle.retain(|(c, _), _| {
            let keep = *c != chat;
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }
}

#[async_trait]
impl UserDirectory for SeenUsers {
    async fn resolve(&self, chat: ChatId, handle: &str) -> Result<Participant, DirectoryError> {
        let handle = handle.trim_start_matches('@');
        self.by_handle
            .get(&(chat, handle.to_lowercase()))
            .map(|p| p.value().clone())
            .ok_or_else(|| DirectoryError::NotFound(handle.to_string()))
    }
}

#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn admins(&self, chat: ChatId) -> Result<Vec<Participant>, DirectoryError>;

    async fn is_admin(&self, chat: ChatId, user: UserId) -> Result<bool, DirectoryError> {
        Ok(self.admins(chat).await?.iter().any(|p| p.id == user))
    }
}

/// Where the admin list of a chat comes from (the Bot API in production).
#[async_trait]
pub trait AdminSource: Send + Sync {
    async fn fetch_admins(&self, chat: ChatId) -> Result<Vec<Participant>, DirectoryError>;
}

/// Per-chat admin cache, filled lazily and refreshed on an interval.
pub struct AdminCache {
    source: Arc<dyn AdminSource>,
    admins: DashMap<ChatId, Vec<Participant>>,
}

impl AdminCache {
    pub fn new(source: Arc<dyn AdminSource>) -> Self {
        Self {
            source,
            admins: DashMap::new(),
        }
    }

    pub async fn refresh(&self, chat: ChatId) -> Result<Vec<Participant>, DirectoryError> {
        let list = self.source.fetch_admins(chat).await?;
        debug!("admins refreshed for chat {}: {}", chat, list.len());
        self.admins.insert(chat, list.clone());
        Ok(list)
    }

    /// Refreshes every chat seen so far. Failures keep the stale list.
    pub async fn refresh_known(&self) {
        let chats: Vec<ChatId> = self.admins.iter().map(|e| *e.key()).collect();
        for chat in chats {
            if let Err(e) = self.refresh(chat).await {
                warn!("refresh_admins failed for chat {}: {:?}", chat, e);
            }
        }
    }

    pub fn forget(&self, chat: ChatId) {
        self.admins.remove(&chat);
    }
}

#[async_trait]
impl AdminDirectory for AdminCache {
    async fn admins(&self, chat: ChatId) -> Result<Vec<Participant>, DirectoryError> {
        if let Some(list) = self.admins.get(&chat) {
            return Ok(list.clone());
        }
        self.refresh(chat).await
    }
}
