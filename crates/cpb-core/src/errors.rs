use std::path::PathBuf;

/// Classified delivery failures.
///
/// The Telegram adapter maps its request errors into these so the core can pick
/// a user-facing diagnostic without knowing about teloxide.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("chat not found")]
    ChatNotFound,

    #[error("invalid username")]
    InvalidUsername,

    #[error("bot is not a member of the chat")]
    NotMember,

    #[error("missing rights: {0}")]
    MissingRights(String),

    #[error("{0}")]
    Other(String),
}

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently (user-facing message vs generic notice).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid transition: {event} while {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

impl Error {
    /// True for failures of the channel registry's backing storage.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::Json(_) | Error::InvalidPath { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
