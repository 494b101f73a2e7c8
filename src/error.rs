//! Error kinds shared by the interpreter, the ledger and the collaborators.

/// Why a message could not be turned into a moderation command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The text does not start with a known verb. Callers ignore this silently.
    #[error("not a moderation command")]
    NotACommand,

    /// Neither a reply nor an `@handle` names the target.
    #[error("command needs a reply or an @mention")]
    MissingTarget,

    /// A duration was attempted but could not be understood.
    #[error("duration is missing or malformed")]
    MissingDuration,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("user @{0} not found")]
    NotFound(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnforcementError {
    /// Network trouble or rate limiting; the same call may succeed later.
    #[error("temporary failure: {0}")]
    Transient(String),

    /// The platform refused the action (missing rights, target is admin, ...).
    #[error("{0}")]
    Permanent(String),
}

impl EnforcementError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EnforcementError::Transient(_))
    }
}
