//! teloxide update routing.

use crate::config::SwearFilterConfig;
use crate::directory::{AdminCache, AdminDirectory, Participant, SeenUsers};
use crate::moderation::{Incoming, Moderator};
use crate::profanity::ProfanityFilter;
use crate::telegram::api_log;
use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    dispatching::UpdateHandler,
    dptree,
    prelude::*,
    types::{ChatJoinRequest, ChatMemberUpdated, Message, ParseMode},
};
use tracing::{info, warn};

const HELP_TEXT: &str = "Я модерирую группы. Добавьте меня в чат администратором.\n\
Команды (ответом на сообщение или с @username):\n\
мут [срок] [причина: …] — запретить писать, например «мут 30 минут причина: флуд»\n\
размут — снять мут\n\
бан [причина: …] — забанить\n\
разбан — снять бан\n\
причина — за что наказан пользователь\n\
/adm — позвать администраторов";

pub struct AppState {
    pub moderator: Moderator,
    pub users: Arc<SeenUsers>,
    pub admins: Arc<AdminCache>,
    pub profanity: ProfanityFilter,
    pub swear: Option<SwearFilterConfig>,
    pub approve_join_requests: bool,
}

async fn handle_group_message(bot: &Bot, state: &AppState, msg: &Message) -> Result<()> {
    let chat_id = msg.chat.id;
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    state.users.remember(chat_id, from);

    let replied_user = msg.reply_to_message().and_then(|m| m.from.as_ref());
    if let Some(u) = replied_user {
        state.users.remember(chat_id, u);
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    let incoming = Incoming {
        chat: chat_id,
        sender: Participant::from(from),
        reply_to: replied_user.map(Participant::from),
        text: text.to_string(),
        sent_at: msg.date,
    };
    let reply = state.moderator.handle(&incoming).await;
    let answered_command = reply.is_some();
    if let Some(reply) = reply {
        let req = bot.send_message(chat_id, reply.text);
        let req = if reply.html {
            req.parse_mode(ParseMode::Html)
        } else {
            req
        };
        let _ = api_log("send_message", req).await;
    }

    let Some(sf) = state.swear.as_ref() else {
        return Ok(());
    };
    if !state.profanity.is_match(text) {
        return Ok(());
    }
    let sender_is_admin = state
        .admins
        .is_admin(chat_id, from.id)
        .await
        .unwrap_or(false);
    if swear_verdict(sf, answered_command, sender_is_admin) {
        info!("profanity from {} in chat {}", from.id, chat_id);
        let _ = api_log("delete_message", bot.delete_message(chat_id, msg.id)).await;
        let _ = api_log("send_message", bot.send_message(chat_id, sf.reply())).await;
    }

    Ok(())
}

/// Whether a message that matched the swear filter gets deleted.
///
/// Admin commands the moderator answered are never deleted; other admin
/// messages only when `ignore_admins` is off.
fn swear_verdict(sf: &SwearFilterConfig, answered_command: bool, sender_is_admin: bool) -> bool {
    if !sender_is_admin {
        return true;
    }
    !answered_command && !sf.ignore_admins()
}

/// Forgets per-chat caches once the bot is no longer a member.
fn handle_bot_membership(state: &AppState, upd: &ChatMemberUpdated) {
    if upd.new_chat_member.kind.is_present() {
        return;
    }
    let chat = upd.chat.id;
    state.admins.forget(chat);
    let dropped = state.users.forget_chat(chat);
    info!("left chat {}; forgot {} usernames", chat, dropped);
}

async fn handle_private_message(bot: &Bot, msg: &Message) -> Result<()> {
    if msg.text().is_some_and(|t| t.starts_with("/start") || t.starts_with("/help")) {
        let _ = api_log("send_message", bot.send_message(msg.chat.id, HELP_TEXT)).await;
    }
    Ok(())
}

async fn handle_join_request(bot: &Bot, state: &AppState, req: &ChatJoinRequest) -> Result<()> {
    if !state.approve_join_requests {
        return Ok(());
    }
    info!("approving join request of {} to chat {}", req.from.id, req.chat.id);
    let _ = api_log(
        "approve_chat_join_request",
        bot.approve_chat_join_request(req.chat.id, req.from.id),
    )
    .await;
    Ok(())
}

pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message().endpoint(
                |bot: Bot, state: Arc<AppState>, msg: Message| async move {
                    let res = if msg.chat.is_private() {
                        handle_private_message(&bot, &msg).await
                    } else {
                        handle_group_message(&bot, &state, &msg).await
                    };
                    if let Err(e) = res {
                        warn!("message handler failed: {:?}", e);
                    }
                    Ok(())
                },
            ),
        )
        .branch(Update::filter_my_chat_member().endpoint(
            |state: Arc<AppState>, upd: ChatMemberUpdated| async move {
                handle_bot_membership(&state, &upd);
                Ok(())
            },
        ))
        .branch(
            Update::filter_chat_join_request().endpoint(
                |bot: Bot, state: Arc<AppState>, req: ChatJoinRequest| async move {
                    if let Err(e) = handle_join_request(&bot, &state, &req).await {
                        warn!("join request handler failed: {:?}", e);
                    }
                    Ok(())
                },
            ),
        )
}
