use thiserror::Error;

pub type Result<T> = std::result::Result<T, NoteError>;

/// Error type for note codec and search operations
#[derive(Debug, Error)]
pub enum NoteError {
    /// Malformed, truncated or unrecognized container
    #[error("Format error: {0}")]
    Format(String),

    /// Authentication failed. Deliberately does not say whether the password
    /// was wrong or the container was damaged.
    #[error("Password invalid or note corrupted")]
    WrongPasswordOrCorrupt,

    /// Underlying stream failure, passed through unchanged
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Query that cannot be searched (e.g. empty)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Key derivation failures (bad work factor, KDF errors)
    #[error("Key error: {0}")]
    Key(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Session operation attempted in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl NoteError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::Key(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures the caller may answer by asking for the password again.
    pub fn is_password_failure(&self) -> bool {
        matches!(self, Self::WrongPasswordOrCorrupt)
    }
}
