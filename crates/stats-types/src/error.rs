//! Error taxonomy surfaced by the fetch client.

use crate::OutcomeKind;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The resource exists but the backend has not finished computing it.
    #[error("{method} {endpoint}: still computing")]
    StillComputing { method: String, endpoint: String },

    /// Application-level failure reported in the envelope. Retrying the same input will not help.
    #[error("{method} {endpoint}: {msg} (code {code})")]
    User {
        method: String,
        endpoint: String,
        msg: String,
        code: i64,
    },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{method} {endpoint}: max retries exceeded")]
    MaxRetries { method: String, endpoint: String },

    #[error("request aborted")]
    Aborted,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected data: {0}")]
    UnexpectedData(String),
}

impl FetchError {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            FetchError::StillComputing { .. } => OutcomeKind::StillComputing,
            FetchError::User { .. } => OutcomeKind::UserError,
            FetchError::Api { .. } | FetchError::Transport(_) | FetchError::Decode(_) => {
                OutcomeKind::Transient
            }
            FetchError::MaxRetries { .. } => OutcomeKind::MaxRetries,
            FetchError::Aborted => OutcomeKind::Aborted,
            FetchError::InvalidRequest(_) | FetchError::UnexpectedData(_) => OutcomeKind::Invalid,
        }
    }

    /// Whether the client retries this error inline.
    pub fn is_retryable(&self) -> bool {
        self.kind() == OutcomeKind::Transient
    }
}
