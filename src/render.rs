//! Chat-facing texts for moderation outcomes.

use crate::command::{MuteDuration, TimeUnit};
use crate::directory::Participant;
use crate::error::ParseError;
use crate::ledger::{PunishmentKind, PunishmentRecord};
use chrono::{DateTime, Utc};
use teloxide::utils::html;

pub const FOREVER: &str = "Навсегда";

/// Russian noun agreement: 1 минута, 2 минуты, 5 минут, 21 минута, 11 минут.
pub fn plural_ru<'a>(n: u64, one: &'a str, few: &'a str, many: &'a str) -> &'a str {
    let n100 = n % 100;
    let n10 = n % 10;
    if (11..=14).contains(&n100) {
        many
    } else if n10 == 1 {
        one
    } else if (2..=4).contains(&n10) {
        few
    } else {
        many
    }
}

pub fn format_duration(d: &MuteDuration) -> String {
    let n = d.amount;
    let word = match d.unit {
        TimeUnit::Minute => plural_ru(n, "минута", "минуты", "минут"),
        TimeUnit::Hour => plural_ru(n, "час", "часа", "часов"),
        TimeUnit::Day => plural_ru(n, "день", "дня", "дней"),
        TimeUnit::Week => plural_ru(n, "неделя", "недели", "недель"),
    };
    format!("{} {}", n, word)
}

pub fn format_until(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M UTC").to_string()
}

pub fn user_link(p: &Participant) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        p.id,
        html::escape(&p.display)
    )
}

pub fn mute_notice(target: &Participant, term: &str, reason: &str) -> String {
    format!(
        "🔇 Мут\nПользователь: {}\nСрок: {}\nПричина: {}",
        target.display, term, reason
    )
}

pub fn ban_notice(target: &Participant, reason: &str) -> String {
    format!("🚫 Бан\nПользователь: {}\nПричина: {}", target.display, reason)
}

pub fn unmute_notice(target: &Participant) -> String {
    format!("🔊 Размут\nПользователь: {}", target.display)
}

pub fn unban_notice(target: &Participant) -> String {
    format!("✅ Разбан\nПользователь: {}", target.display)
}

pub fn reason_notice(target: &Participant, record: &PunishmentRecord) -> String {
    let kind = match record.kind {
        PunishmentKind::Mute => "мут",
        PunishmentKind::Ban => "бан",
    };
    let term = match record.expires_at {
        Some(at) => format!("до {}", format_until(at)),
        None => FOREVER.to_lowercase(),
    };
    format!(
        "ℹ️ {}: {} {}\nПричина: {}\nВыдал: {}",
        target.display, kind, term, record.reason, record.issued_by
    )
}

pub fn no_punishment(target: &Participant) -> String {
    format!("У пользователя {} нет активных наказаний.", target.display)
}

/// HTML text: admins are mentioned through `tg://user` links.
pub fn admin_call(admins: &[Participant]) -> Option<String> {
    let mentions: Vec<String> = admins
        .iter()
        .filter(|p| !p.is_bot)
        .map(user_link)
        .collect();
    if mentions.is_empty() {
        return None;
    }
    Some(format!("🚨 Вызов администраторов:\n{}", mentions.join(" ")))
}

pub const MISSING_TARGET: &str =
    "Команду нужно писать ответом на сообщение пользователя или указать @username.";

/// Text explaining a malformed command. Plain chatter gets no answer.
pub fn parse_error(e: &ParseError) -> Option<&'static str> {
    match e {
        ParseError::NotACommand => None,
        ParseError::MissingTarget => Some(MISSING_TARGET),
        ParseError::MissingDuration => {
            Some("Не понял срок. Пример: «мут 30 минут», «мут 2 часа», «мут 1 день».")
        }
    }
}
