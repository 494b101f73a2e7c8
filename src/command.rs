//! Moderation command interpreter.
//!
//! Turns free chat text such as `/мут 30 минут причина: флуд` into a
//! [`Command`]. Pure: no I/O, same input always gives the same output.
//! Resolving `@handle` to a user is left to the caller.

use crate::error::ParseError;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reason recorded when the moderator did not give one.
pub const UNSPECIFIED_REASON: &str = "Не указана";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub target: TargetRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Mute {
        duration: Option<MuteDuration>,
        reason: Option<String>,
    },
    Unmute,
    Ban {
        reason: Option<String>,
    },
    Unban,
    ReasonQuery,
    AdminSummon,
}

impl Action {
    /// Whether the action is meaningless without a concrete target user.
    pub fn requires_target(&self) -> bool {
        !matches!(self, Action::AdminSummon)
    }

    /// Whether only chat admins may issue it.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Action::Mute { .. } | Action::Unmute | Action::Ban { .. } | Action::Unban
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// The author of the message being replied to.
    Reply,
    /// `@handle`, stored without the `@`.
    Mention(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteDuration {
    pub amount: u64,
    pub unit: TimeUnit,
}

impl MuteDuration {
    pub fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    /// `None` when the value does not fit a `chrono::Duration`.
    pub fn to_chrono(&self) -> Option<Duration> {
        let amount = i64::try_from(self.amount).ok()?;
        match self.unit {
            TimeUnit::Minute => Duration::try_minutes(amount),
            TimeUnit::Hour => Duration::try_hours(amount),
            TimeUnit::Day => Duration::try_days(amount),
            TimeUnit::Week => Duration::try_weeks(amount),
        }
    }
}

const VERBS: &[(&str, Verb)] = &[
    ("размутить", Verb::Unmute),
    ("разбанить", Verb::Unban),
    ("admin-call", Verb::AdminSummon),
    ("замутить", Verb::Mute),
    ("забанить", Verb::Ban),
    ("причина", Verb::Reason),
    ("размут", Verb::Unmute),
    ("разбан", Verb::Unban),
    ("unmute", Verb::Unmute),
    ("reason", Verb::Reason),
    ("report", Verb::AdminSummon),
    ("админы", Verb::AdminSummon),
    ("за что", Verb::Reason),
    ("анмут", Verb::Unmute),
    ("unban", Verb::Unban),
    ("admin", Verb::AdminSummon),
    ("админ", Verb::AdminSummon),
    ("mute", Verb::Mute),
    ("мут", Verb::Mute),
    ("бан", Verb::Ban),
    ("ban", Verb::Ban),
    ("adm", Verb::AdminSummon),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Mute,
    Unmute,
    Ban,
    Unban,
    Reason,
    AdminSummon,
}

const UNIT_SYNONYMS: &[(&str, TimeUnit)] = &[
    ("м", TimeUnit::Minute),
    ("мин", TimeUnit::Minute),
    ("минута", TimeUnit::Minute),
    ("минуту", TimeUnit::Minute),
    ("минуты", TimeUnit::Minute),
    ("минут", TimeUnit::Minute),
    ("m", TimeUnit::Minute),
    ("min", TimeUnit::Minute),
    ("mins", TimeUnit::Minute),
    ("minute", TimeUnit::Minute),
    ("minutes", TimeUnit::Minute),
    ("ч", TimeUnit::Hour),
    ("час", TimeUnit::Hour),
    ("часа", TimeUnit::Hour),
    ("часов", TimeUnit::Hour),
    ("h", TimeUnit::Hour),
    ("hr", TimeUnit::Hour),
    ("hour", TimeUnit::Hour),
    ("hours", TimeUnit::Hour),
    ("д", TimeUnit::Day),
    ("дн", TimeUnit::Day),
    ("день", TimeUnit::Day),
    ("дня", TimeUnit::Day),
    ("дней", TimeUnit::Day),
    ("сутки", TimeUnit::Day),
    ("суток", TimeUnit::Day),
    ("d", TimeUnit::Day),
    ("day", TimeUnit::Day),
    ("days", TimeUnit::Day),
    ("н", TimeUnit::Week),
    ("нед", TimeUnit::Week),
    ("неделя", TimeUnit::Week),
    ("неделю", TimeUnit::Week),
    ("недели", TimeUnit::Week),
    ("недель", TimeUnit::Week),
    ("w", TimeUnit::Week),
    ("week", TimeUnit::Week),
    ("weeks", TimeUnit::Week),
];

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s*(\p{L}+)?").expect("duration regex"));
static REASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(?:причина|reason)\s*:(.*)").expect("reason regex"));
static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)@([A-Za-z0-9_]{1,32})\b").expect("mention regex"));

/// Parses a message assuming a reply target is available when no mention is given.
pub fn parse(raw: &str) -> Result<Command, ParseError> {
    parse_in_context(raw, true)
}

/// Parses a message; `has_reply` tells whether the message replies to someone.
pub fn parse_in_context(raw: &str, has_reply: bool) -> Result<Command, ParseError> {
    let (verb, rest) = split_verb(raw).ok_or(ParseError::NotACommand)?;
    let (head, reason) = split_reason(rest);

    let target = match MENTION_RE.captures(head) {
        Some(c) => TargetRef::Mention(c[1].to_string()),
        None => TargetRef::Reply,
    };

    let action = match verb {
        Verb::Mute => Action::Mute {
            duration: scan_duration(head)?,
            reason,
        },
        Verb::Unmute => Action::Unmute,
        Verb::Ban => Action::Ban { reason },
        Verb::Unban => Action::Unban,
        Verb::Reason => Action::ReasonQuery,
        Verb::AdminSummon => Action::AdminSummon,
    };

    if action.requires_target() && target == TargetRef::Reply && !has_reply {
        return Err(ParseError::MissingTarget);
    }

    Ok(Command { action, target })
}

/// Strips the command prefix and `@botname`, returning the verb and the text after it.
fn split_verb(raw: &str) -> Option<(Verb, &str)> {
    let t = raw.trim_start();
    let t = t.strip_prefix('/').or_else(|| t.strip_prefix('!')).unwrap_or(t);

    for (word, verb) in VERBS {
        let Some(prefix) = t.get(..word.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(word) && prefix.to_lowercase() != *word {
            continue;
        }
        let rest = &t[word.len()..];
        match rest.chars().next() {
            None => return Some((*verb, rest)),
            Some(c) if c.is_whitespace() || matches!(c, '?' | '!' | '.' | ',' | ':') => {
                return Some((*verb, rest))
            }
            Some('@') => {
                // `/mute@my_bot 10m`: drop the bot address glued to the verb
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                return Some((*verb, &rest[end..]));
            }
            Some(_) => continue,
        }
    }
    None
}

/// Splits off the free-text reason. Label form wins over the line form.
fn split_reason(rest: &str) -> (&str, Option<String>) {
    if let Some(c) = REASON_RE.captures(rest) {
        let whole = c.get(0).map(|m| m.start()).unwrap_or(rest.len());
        let text = c[1].trim();
        let reason = (!text.is_empty()).then(|| text.to_string());
        return (&rest[..whole], reason);
    }
    if let Some((first, tail)) = rest.split_once('\n') {
        let text = tail.trim();
        let reason = (!text.is_empty()).then(|| text.to_string());
        return (first, reason);
    }
    (rest, None)
}

fn scan_duration(head: &str) -> Result<Option<MuteDuration>, ParseError> {
    let Some(c) = DURATION_RE.captures(head) else {
        return Ok(None);
    };
    let amount: u64 = c[1].parse().map_err(|_| ParseError::MissingDuration)?;
    if amount == 0 {
        return Err(ParseError::MissingDuration);
    }
    let unit = c
        .get(2)
        .and_then(|m| lookup_unit(m.as_str()))
        .ok_or(ParseError::MissingDuration)?;
    Ok(Some(MuteDuration::new(amount, unit)))
}

fn lookup_unit(word: &str) -> Option<TimeUnit> {
    let w = word.to_lowercase();
    UNIT_SYNONYMS
        .iter()
        .find(|(syn, _)| *syn == w)
        .map(|(_, unit)| *unit)
}
