//! Client-side failures

use thiserror::Error;

/// Errors surfaced by client operations
///
/// `Validation` is always raised before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Failures the user should be told about
    pub const fn is_reportable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<stackboard_protocol::ProtocolError> for ClientError {
    fn from(e: stackboard_protocol::ProtocolError) -> Self {
        Self::Transport(e.to_string())
    }
}
