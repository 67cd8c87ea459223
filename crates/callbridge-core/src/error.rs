//! Error types for the call-agent engine.
//!
//! Capability adapters convert platform failures into these variants at the
//! boundary; the orchestrator never handles raw transport errors.

use thiserror::Error;

/// Result type alias for engine operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur in the conversation engine.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("call answer failed: all mechanisms exhausted")]
    CallAnswerFailed,

    #[error("speech capture error: {0}")]
    Capture(String),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("audio route error: {0}")]
    AudioRoute(String),

    #[error("no usable recognition language: {0}")]
    Language(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from the chat-completion backend, classified so the retry policy
/// can tell transient trouble from errors that can never succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// 401/403: bad or missing credentials.
    #[error("backend rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    /// 400/422: the request itself was rejected as malformed.
    #[error("backend rejected request: {0}")]
    Malformed(String),

    /// 429: rate limited.
    #[error("backend rate limited")]
    RateLimited,

    /// Connect failure or connect/read timeout.
    #[error("backend network error: {0}")]
    Network(String),

    /// Any other non-success HTTP status (5xx and unexpected 4xx).
    #[error("backend HTTP error {0}")]
    Http(u16),

    /// 200 but the reply payload could not be decoded.
    #[error("backend reply malformed: {0}")]
    BadReply(String),
}

impl BackendError {
    /// Fatal errors cannot succeed on retry regardless of remaining budget.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Malformed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_malformed_are_fatal() {
        assert!(BackendError::Unauthorized(401).is_fatal());
        assert!(BackendError::Malformed("bad json".into()).is_fatal());
        assert!(!BackendError::RateLimited.is_fatal());
        assert!(!BackendError::Http(503).is_fatal());
        assert!(!BackendError::Network("reset".into()).is_fatal());
    }
}
