//! callbridge-core: shared types for the phone-call voice agent.
//!
//! Holds everything the voice loop and the daemon agree on: the session
//! model, the bilingual language/locale machinery, the chat-backend bridge
//! with its retry policy, the utterance catalog, and configuration.

mod backend;
mod config;
mod error;
mod language;
mod retry;
mod session;
pub mod prompts;

// Errors
pub use error::{AgentError, AgentResult, BackendError};

// Language and locale fallback
pub use language::{
    detect_language, Lang, LanguagePreference, LanguageResolver, Locale, DEFAULT_PRIMARY,
};

// Session model
pub use session::{
    BackendRequest, CallContext, ConversationSession, ListenOutcome, SessionState, SpeakOutcome,
    SpeechTurn,
};

// Chat backend (Groq bridge + placeholder)
pub use backend::{classify_status, ChatBackend, GroqBridge, PlaceholderBackend};

// Retry policy
pub use retry::{RetryDecision, RetryPolicy};

// Configuration
pub use config::{
    AgentConfig, BackendSettings, GuardSettings, RetrySettings, SpeechSettings,
};
