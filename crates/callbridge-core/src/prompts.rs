//! Utterance and prompt catalog for both supported languages.
//!
//! Everything the agent ever says without the backend's help lives here:
//! greetings, the apology after backend exhaustion, the farewell at the
//! duration limit, and the bilingual system prompts sent with every
//! completion request.

use crate::language::Lang;

/// System prompt sent to the chat backend.
pub fn system_prompt(lang: Lang) -> &'static str {
    match lang {
        Lang::Bengali => "আপনি একজন বন্ধুসুলভ ফোন সহকারী। উত্তর দিন সংক্ষেপে।",
        Lang::English => {
            "You are a friendly phone assistant. Keep responses short, conversational, and helpful."
        }
    }
}

/// Greeting for a session the user started by hand.
pub fn greeting_tap_to_start() -> &'static str {
    "Hello! I'm your voice assistant. How can I help you today?"
}

/// Greeting for a session bridged from an incoming call.
pub fn greeting_incoming_call() -> &'static str {
    "Hello! This is an AI assistant. How can I help you?"
}

/// Spoken when the backend gives up (retries exhausted on a transient error).
pub fn apology(lang: Lang) -> &'static str {
    match lang {
        Lang::Bengali => "দুঃখিত, সমস্যা হয়েছে। আবার চেষ্টা করুন।",
        Lang::English => "Sorry, I encountered an error. Let's try again.",
    }
}

/// Spoken before the session is force-ended at the duration hard limit.
pub fn farewell(lang: Lang) -> &'static str {
    match lang {
        Lang::Bengali => "আমাদের সময় শেষ। কল করার জন্য ধন্যবাদ। বিদায়!",
        Lang::English => "We're out of time. Thank you for calling. Goodbye!",
    }
}

/// Spoken when connectivity is lost mid-call, right before stopping.
pub fn network_lost(lang: Lang) -> &'static str {
    match lang {
        Lang::Bengali => "দুঃখিত, নেটওয়ার্ক সংযোগ বিচ্ছিন্ন হয়েছে। বিদায়।",
        Lang::English => "Sorry, the network connection was lost. Goodbye.",
    }
}

/// Spoken on a fatal backend error (bad credentials or malformed requests),
/// right before stopping. Retrying cannot help, so say so and end the call.
pub fn configuration_error(lang: Lang) -> &'static str {
    match lang {
        Lang::Bengali => "দুঃখিত, সহকারীটি সঠিকভাবে কনফিগার করা নেই। বিদায়।",
        Lang::English => "Sorry, the assistant is not configured correctly. Goodbye.",
    }
}
