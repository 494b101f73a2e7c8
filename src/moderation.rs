//! Moderation flow: parse → check rights → resolve target → enforce → record.

use crate::command::{self, Action, Command, TargetRef, UNSPECIFIED_REASON};
use crate::directory::{AdminDirectory, Participant, UserDirectory};
use crate::enforcement::{Enforcement, Restriction};
use crate::error::DirectoryError;
use crate::ledger::{Ledger, PunishmentKind, PunishmentRecord};
use crate::render;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use teloxide::types::ChatId;
use tracing::{debug, error, info, warn};

/// A group message as seen by the moderator.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat: ChatId,
    pub sender: Participant,
    /// Author of the message being replied to.
    pub reply_to: Option<Participant>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub html: bool,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
        }
    }

    fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Longest mute accepted from a command.
    pub max_mute: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_mute: Duration::days(366),
        }
    }
}

pub struct Moderator {
    ledger: Arc<Ledger>,
    users: Arc<dyn UserDirectory>,
    admins: Arc<dyn AdminDirectory>,
    enforcer: Arc<dyn Enforcement>,
    limits: Limits,
}

impl Moderator {
    pub fn new(
        ledger: Arc<Ledger>,
        users: Arc<dyn UserDirectory>,
        admins: Arc<dyn AdminDirectory>,
        enforcer: Arc<dyn Enforcement>,
        limits: Limits,
    ) -> Self {
        Self {
            ledger,
            users,
            admins,
            enforcer,
            limits,
        }
    }

    /// Returns the text to answer with, or `None` when the bot stays silent.
    ///
    /// Malformed and privileged commands are only answered for admins; from
    /// anyone else such a message is treated as ordinary chatter.
    pub async fn handle(&self, msg: &Incoming) -> Option<Reply> {
        let cmd = match command::parse_in_context(&msg.text, msg.reply_to.is_some()) {
            Ok(cmd) => cmd,
            Err(e) => {
                let text = render::parse_error(&e)?;
                return match self.is_admin(msg.chat, &msg.sender).await {
                    Ok(true) => Some(Reply::plain(text)),
                    Ok(false) | Err(_) => None,
                };
            }
        };
        if cmd.action.is_privileged() {
            match self.is_admin(msg.chat, &msg.sender).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        "ignoring {:?} from non-admin {} in chat {}",
                        cmd.action, msg.sender.id, msg.chat
                    );
                    return None;
                }
                Err(refusal) => return Some(refusal),
            }
        }
        info!(
            "command {:?} from {} in chat {}",
            cmd.action, msg.sender.id, msg.chat
        );
        Some(match self.execute(msg, cmd).await {
            Ok(reply) | Err(reply) => reply,
        })
    }

    async fn execute(&self, msg: &Incoming, cmd: Command) -> Result<Reply, Reply> {
        if cmd.action == Action::AdminSummon {
            return self.summon_admins(msg.chat).await;
        }

        let target = self.resolve_target(msg, &cmd.target).await?;

        match cmd.action {
            Action::ReasonQuery => Ok(self.explain(msg.chat, &target)),
            Action::Mute { duration, reason } => {
                self.guard_target(msg, &target).await?;
                let (until, term) = match duration {
                    None => (None, render::FOREVER.to_string()),
                    Some(d) => {
                        let span = d
                            .to_chrono()
                            .filter(|span| *span <= self.limits.max_mute)
                            .ok_or_else(|| {
                                Reply::plain(format!(
                                    "Слишком большой срок, максимум {} дней.",
                                    self.limits.max_mute.num_days()
                                ))
                            })?;
                        (Some(msg.sent_at + span), render::format_duration(&d))
                    }
                };
                let reason = reason.unwrap_or_else(|| UNSPECIFIED_REASON.to_string());
                self.enforce(msg.chat, &target, Restriction::Mute { until })
                    .await?;
                let text = render::mute_notice(&target, &term, &reason);
                Ok(self.record(msg, &target, PunishmentKind::Mute, until, reason, text))
            }
            Action::Ban { reason } => {
                self.guard_target(msg, &target).await?;
                let reason = reason.unwrap_or_else(|| UNSPECIFIED_REASON.to_string());
                self.enforce(msg.chat, &target, Restriction::Ban).await?;
                let text = render::ban_notice(&target, &reason);
                Ok(self.record(msg, &target, PunishmentKind::Ban, None, reason, text))
            }
            Action::Unmute => {
                self.enforce(msg.chat, &target, Restriction::LiftMute)
                    .await?;
                let text = render::unmute_notice(&target);
                Ok(self.release(msg.chat, &target, PunishmentKind::Mute, text))
            }
            Action::Unban => {
                self.enforce(msg.chat, &target, Restriction::LiftBan).await?;
                let text = render::unban_notice(&target);
                Ok(self.release(msg.chat, &target, PunishmentKind::Ban, text))
            }
            Action::AdminSummon => self.summon_admins(msg.chat).await,
        }
    }

    async fn is_admin(&self, chat: ChatId, who: &Participant) -> Result<bool, Reply> {
        self.admins.is_admin(chat, who.id).await.map_err(|e| {
            warn!("admin lookup failed in chat {}: {:?}", chat, e);
            Reply::plain("Не удалось получить список администраторов.")
        })
    }

    async fn resolve_target(&self, msg: &Incoming, target: &TargetRef) -> Result<Participant, Reply> {
        match target {
            TargetRef::Reply => msg
                .reply_to
                .clone()
                .ok_or_else(|| Reply::plain(render::MISSING_TARGET)),
            TargetRef::Mention(handle) => {
                self.users
                    .resolve(msg.chat, handle)
                    .await
                    .map_err(|e| match e {
                        DirectoryError::NotFound(h) => {
                            Reply::plain(format!("Пользователь @{} не найден.", h))
                        }
                        DirectoryError::Unavailable(reason) => {
                            warn!("user directory unavailable: {}", reason);
                            Reply::plain("Не удалось найти пользователя, попробуйте ответом на сообщение.")
                        }
                    })
            }
        }
    }

    /// Refuses to punish the sender themselves or another admin.
    async fn guard_target(&self, msg: &Incoming, target: &Participant) -> Result<(), Reply> {
        if target.id == msg.sender.id {
            return Err(Reply::plain("Нельзя наказать самого себя."));
        }
        if self.is_admin(msg.chat, target).await? {
            return Err(Reply::plain("Нельзя наказать администратора."));
        }
        Ok(())
    }

    async fn enforce(
        &self,
        chat: ChatId,
        target: &Participant,
        restriction: Restriction,
    ) -> Result<(), Reply> {
        self.enforcer
            .apply(chat, target.id, restriction)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    Reply::plain("Telegram не ответил, попробуйте ещё раз.")
                } else {
                    Reply::plain(format!("Ошибка: {}", e))
                }
            })
    }

    fn record(
        &self,
        msg: &Incoming,
        target: &Participant,
        kind: PunishmentKind,
        expires_at: Option<DateTime<Utc>>,
        reason: String,
        text: String,
    ) -> Reply {
        let record = PunishmentRecord {
            subject: target.id,
            chat: msg.chat,
            kind,
            expires_at,
            reason,
            issued_by: msg.sender.display.clone(),
            issued_at: msg.sent_at,
        };
        match self.ledger.upsert(record) {
            Ok(()) => Reply::plain(text),
            Err(e) => {
                error!("ledger upsert failed for user {}: {:?}", target.id, e);
                Reply::plain(format!("{}\n⚠️ Наказание применено, но не сохранено.", text))
            }
        }
    }

    /// Drops the record only when it is of `kind`; a ban survives `размут`
    /// and a mute survives `разбан`.
    fn release(
        &self,
        chat: ChatId,
        target: &Participant,
        kind: PunishmentKind,
        text: String,
    ) -> Reply {
        match self.ledger.clear_kind(target.id, chat, kind) {
            Ok(_) => Reply::plain(text),
            Err(e) => {
                error!("ledger clear failed for user {}: {:?}", target.id, e);
                Reply::plain(format!("{}\n⚠️ Изменение не сохранено.", text))
            }
        }
    }

    fn explain(&self, chat: ChatId, target: &Participant) -> Reply {
        match self.ledger.lookup(target.id, chat) {
            Some(record) => Reply::plain(render::reason_notice(target, &record)),
            None => Reply::plain(render::no_punishment(target)),
        }
    }

    async fn summon_admins(&self, chat: ChatId) -> Result<Reply, Reply> {
        let admins = self.admins.admins(chat).await.map_err(|e| {
            warn!("admin lookup failed in chat {}: {:?}", chat, e);
            Reply::plain("Не удалось получить список администраторов.")
        })?;
        Ok(match render::admin_call(&admins) {
            Some(text) => Reply::html(text),
            None => Reply::plain("Администраторы не найдены"),
        })
    }
}
