//! Session model: one conversation per call (or tap-to-start), plus the
//! per-turn records the orchestrator threads through the engine.

use crate::language::{Lang, LanguagePreference, Locale};
use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle state of a conversation session. Mirrors the orchestrator's
/// phase; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Listening,
    Thinking,
    Speaking,
    Stopped,
}

/// Present only when the session originated from an incoming call. Owned by
/// the session and dropped with it.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub phone_number: String,
    pub display_name: Option<String>,
    pub answered_at: DateTime<Utc>,
}

impl CallContext {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            display_name: None,
            answered_at: Utc::now(),
        }
    }
}

/// One active conversation. At most one session exists per device at a time;
/// the orchestrator rejects `start()` while a session is live.
#[derive(Debug)]
pub struct ConversationSession {
    pub id: Uuid,
    pub state: SessionState,
    /// Monotonic start for the duration guard.
    pub started_at: Instant,
    /// Wall-clock start for logs and telemetry.
    pub created_at: DateTime<Utc>,
    pub language_preference: LanguagePreference,
    pub active_language: Lang,
    /// Failed backend attempts in the current turn; reset to 0 on success.
    pub retry_count: u32,
    pub call_context: Option<CallContext>,
}

impl ConversationSession {
    pub fn new(
        preference: LanguagePreference,
        active_language: Lang,
        call_context: Option<CallContext>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Starting,
            started_at: Instant::now(),
            created_at: Utc::now(),
            language_preference: preference,
            active_language,
            retry_count: 0,
            call_context,
        }
    }

    /// True when the session was bridged from an incoming call rather than
    /// started by the user.
    pub fn is_call(&self) -> bool {
        self.call_context.is_some()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Result of one listen attempt, as reported by the capture capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Attempt is still in flight.
    Pending,
    Transcript(String),
    /// Speech was heard but nothing matched the requested locale.
    NoMatch,
    /// No speech before the silence timeout.
    Timeout,
    /// The recognizer is held by another client; retry after a fixed delay.
    Busy,
    /// Connectivity lost mid-capture. Fatal for the session.
    NetworkLoss,
    /// Any other engine-specific error code.
    Other(i32),
}

/// Result of one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Done,
    Error(String),
}

/// One listen→transcribe attempt. Created when listening starts and consumed
/// by the orchestrator on completion; never persisted.
#[derive(Debug, Clone)]
pub struct SpeechTurn {
    pub locale_attempted: Locale,
    /// 0-based position within the locale fallback chain.
    pub attempt_index: u32,
    pub outcome: ListenOutcome,
}

impl SpeechTurn {
    pub fn pending(locale: Locale, attempt_index: u32) -> Self {
        Self {
            locale_attempted: locale,
            attempt_index,
            outcome: ListenOutcome::Pending,
        }
    }

    /// The same attempt with its recognition result filled in.
    pub fn completed(mut self, outcome: ListenOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// One AI query attempt. `attempt` is 1-based and never exceeds the retry
/// budget; fatal errors are never re-issued.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub prompt: String,
    pub language: Lang,
    pub attempt: u32,
    pub scheduled_at: Instant,
}

impl BackendRequest {
    pub fn first(prompt: impl Into<String>, language: Lang) -> Self {
        Self {
            prompt: prompt.into(),
            language,
            attempt: 1,
            scheduled_at: Instant::now(),
        }
    }

    /// The follow-up attempt after a retryable failure.
    pub fn next(&self) -> Self {
        Self {
            prompt: self.prompt.clone(),
            language: self.language,
            attempt: self.attempt + 1,
            scheduled_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_starts_in_starting_state() {
        let session = ConversationSession::new(LanguagePreference::Auto, Lang::Bengali, None);
        assert_eq!(session.state, SessionState::Starting);
        assert_eq!(session.retry_count, 0);
        assert!(!session.is_call());
    }

    #[test]
    fn call_sessions_carry_their_context() {
        let ctx = CallContext::new("+8801712345678");
        let session =
            ConversationSession::new(LanguagePreference::Auto, Lang::Bengali, Some(ctx));
        assert!(session.is_call());
        assert_eq!(
            session.call_context.as_ref().unwrap().phone_number,
            "+8801712345678"
        );
    }

    #[test]
    fn speech_turn_completion_keeps_the_locale() {
        let turn = SpeechTurn::pending(Locale::BengaliBd, 1);
        assert_eq!(turn.outcome, ListenOutcome::Pending);
        let done = turn.completed(ListenOutcome::NoMatch);
        assert_eq!(done.locale_attempted, Locale::BengaliBd);
        assert_eq!(done.attempt_index, 1);
        assert_eq!(done.outcome, ListenOutcome::NoMatch);
    }

    #[test]
    fn backend_request_attempts_increment() {
        let first = BackendRequest::first("hello", Lang::English);
        assert_eq!(first.attempt, 1);
        let second = first.next();
        assert_eq!(second.attempt, 2);
        assert_eq!(second.prompt, "hello");
    }
}
