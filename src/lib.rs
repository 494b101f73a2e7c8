//! Telegram group moderation: command interpreter, punishment ledger and the
//! bot plumbing around them.

pub mod command;
pub mod config;
pub mod directory;
pub mod enforcement;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod moderation;
pub mod profanity;
pub mod render;
pub mod store;
pub mod sweeper;
pub mod telegram;

pub use command::{parse, parse_in_context, Action, Command, MuteDuration, TargetRef, TimeUnit};
pub use error::{DirectoryError, EnforcementError, ParseError, StorageError};
pub use ledger::{Ledger, PunishmentKind, PunishmentRecord};
