//! Error types for Folio.

use std::io;

use crate::model::SessionHandle;

/// Errors produced by the Folio API surface.
///
/// Preview failures that the engine recovers from (or reports through the
/// notifier) are [`FailureReason`](crate::model::FailureReason)s, not
/// `FolioError`s.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("config error: {0}")]
    Config(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("unknown session: {0}")]
    UnknownSession(SessionHandle),

    #[error("no alternate content available")]
    NoAlternate,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FolioError>;
