//! # Callbridge Voice - Phone-Call Conversation Engine
//!
//! Sequences a bilingual (Bengali/English) voice conversation over a phone
//! call: answer the call, greet, then cycle listening → thinking → speaking
//! until a stop phrase, the caller hangs up, or the duration guard expires.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Conversation Engine                       │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │   Capture   │ → │ Chat Backend │ → │    Synthesis    │   │
//! │  │ (STT seam)  │   │ (Groq, retry)│   │   (TTS seam)    │   │
//! │  └─────────────┘   └──────────────┘   └─────────────────┘   │
//! │        ↑                                       │            │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │ Call Answer │   │ Line Events  │   │ Duration Guard  │   │
//! │  │  (cascade)  │ ← │  (Ringing…)  │   │  (warn + stop)  │   │
//! │  └─────────────┘   └──────────────┘   └─────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod answer;
pub mod capabilities;
pub mod guard;
pub mod line;
pub mod orchestrator;
pub mod status;

pub use answer::{AnswerMechanism, AnswerOutcome, CallAnswerStrategy};
pub use capabilities::{
    AudioBusyProbe, AudioRoute, CallAnswerCapability, Connectivity, ListenRequest,
    MechanismScript, PlaceholderAnswer, PlaceholderCapture, PlaceholderConnectivity,
    PlaceholderRoute, PlaceholderSynthesis, SpeechCapture, SpeechSynthesis,
};
pub use guard::{DurationGuard, GuardConfig, GuardEvent};
pub use line::{masked_number, LineEvent};
pub use orchestrator::{
    Capabilities, ConversationEngine, EngineConfig, EngineHandle, SessionOrigin,
};
pub use status::{StateLabel, StatusSnapshot};
