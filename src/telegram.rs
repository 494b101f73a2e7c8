//! Bot API implementations of the enforcement and admin-source seams.

use crate::directory::{AdminSource, Participant};
use crate::enforcement::{Enforcement, Restriction};
use crate::error::{DirectoryError, EnforcementError};
use async_trait::async_trait;
use teloxide::{
    prelude::*,
    requests::{HasPayload, Payload, Request},
    types::ChatPermissions,
    RequestError,
};
use tracing::warn;

fn ctx_perm_hint(ctx: &str) -> &'static str {
    match ctx {
        "restrict_chat_member" => "боту нужны права администратора с разрешением ограничивать участников",
        "ban_chat_member" | "unban_chat_member" => "боту нужны права администратора с разрешением банить участников",
        "delete_message" => "боту нужны права администратора с разрешением удалять сообщения",
        "get_chat_administrators" => "бот должен состоять в чате; список админов недоступен в личке",
        "approve_chat_join_request" => "боту нужны права администратора с разрешением приглашать участников",
        "send_message" => "бот не может писать в этот чат (ограничен или удалён)",
        _ => "проверьте, что бот администратор чата и имеет нужные права",
    }
}

fn log_failure(ctx: &str, e: &impl std::fmt::Debug) {
    warn!("{ctx} failed: {:?} ({})", e, ctx_perm_hint(ctx));
}

/// Sends a request whose failure only needs to be logged.
pub async fn api_log<R>(ctx: &str, req: R) -> Option<<R::Payload as Payload>::Output>
where
    R: Request + HasPayload,
{
    req.send().await.map_err(|e| log_failure(ctx, &e)).ok()
}

async fn api_call<R>(ctx: &str, req: R) -> Result<<R::Payload as Payload>::Output, EnforcementError>
where
    R: Request<Err = RequestError> + HasPayload,
{
    req.send().await.map_err(|e| {
        log_failure(ctx, &e);
        classify(&e)
    })
}

fn classify(e: &RequestError) -> EnforcementError {
    match e {
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_) => {
            EnforcementError::Transient(e.to_string())
        }
        _ => EnforcementError::Permanent(e.to_string()),
    }
}

/// Talks to the real chat through the Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Enforcement for TelegramGateway {
    async fn apply(
        &self,
        chat: ChatId,
        user: UserId,
        restriction: Restriction,
    ) -> Result<(), EnforcementError> {
        match restriction {
            Restriction::Mute { until } => {
                let req = self
                    .bot
                    .restrict_chat_member(chat, user, ChatPermissions::empty());
                let req = match until {
                    Some(at) => req.until_date(at),
                    None => req,
                };
                api_call("restrict_chat_member", req).await?;
            }
            Restriction::LiftMute => {
                api_call(
                    "restrict_chat_member",
                    self.bot
                        .restrict_chat_member(chat, user, ChatPermissions::all()),
                )
                .await?;
            }
            Restriction::Ban => {
                api_call("ban_chat_member", self.bot.ban_chat_member(chat, user)).await?;
            }
            Restriction::LiftBan => {
                api_call(
                    "unban_chat_member",
                    self.bot.unban_chat_member(chat, user).only_if_banned(true),
                )
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdminSource for TelegramGateway {
    async fn fetch_admins(&self, chat: ChatId) -> Result<Vec<Participant>, DirectoryError> {
        let members = self
            .bot
            .get_chat_administrators(chat)
            .send()
            .await
            .map_err(|e| {
                log_failure("get_chat_administrators", &e);
                DirectoryError::Unavailable(e.to_string())
            })?;
        Ok(members.iter().map(|m| Participant::from(&m.user)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_api_error_is_permanent() {
        let e = RequestError::Api(teloxide::ApiError::Unknown(
            "Bad Request: not enough rights".into(),
        ));
        let classified = classify(&e);
        assert!(!classified.is_transient());
        assert!(classified.to_string().contains("not enough rights"));
    }

    #[test]
    fn test_unknown_ctx_has_generic_hint() {
        assert!(ctx_perm_hint("whatever").contains("администратор"));
    }
}
