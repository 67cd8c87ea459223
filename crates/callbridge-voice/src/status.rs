//! Engine status snapshots published over a watch channel.

use callbridge_core::{ConversationSession, SessionState};
use serde::Serialize;

/// Coarse engine state, serialized lowercase for status consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateLabel {
    Idle,
    Starting,
    Listening,
    Thinking,
    Speaking,
    /// The last session ended on a failure, or a start was rejected. Stays
    /// current until the next session starts.
    Error,
}

impl StateLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl From<SessionState> for StateLabel {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle => Self::Idle,
            SessionState::Starting => Self::Starting,
            SessionState::Listening => Self::Listening,
            SessionState::Thinking => Self::Thinking,
            SessionState::Speaking => Self::Speaking,
            // A stopped session reads idle externally; failed endings publish
            // `Error` explicitly.
            SessionState::Stopped => Self::Idle,
        }
    }
}

/// Point-in-time view of the engine, cheap to clone and serialize.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: StateLabel,
    pub session_id: Option<String>,
    /// ISO 639-1 code of the active language.
    pub language: Option<&'static str>,
    pub on_call: bool,
    pub elapsed_secs: u64,
    /// Failed backend attempts in the current turn.
    pub retry_count: u32,
    /// Most recent user transcript of this session.
    pub last_transcript: Option<String>,
    /// Most recent spoken backend reply of this session.
    pub last_reply: Option<String>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            state: StateLabel::Idle,
            session_id: None,
            language: None,
            on_call: false,
            elapsed_secs: 0,
            retry_count: 0,
            last_transcript: None,
            last_reply: None,
        }
    }

    pub fn error() -> Self {
        Self {
            state: StateLabel::Error,
            ..Self::idle()
        }
    }

    pub fn of(session: &ConversationSession) -> Self {
        Self {
            state: session.state.into(),
            session_id: Some(session.id.to_string()),
            language: Some(session.active_language.code()),
            on_call: session.is_call(),
            elapsed_secs: session.elapsed().as_secs(),
            retry_count: session.retry_count,
            last_transcript: None,
            last_reply: None,
        }
    }

    pub fn with_exchange(
        mut self,
        transcript: Option<String>,
        reply: Option<String>,
    ) -> Self {
        self.last_transcript = transcript;
        self.last_reply = reply;
        self
    }
}
