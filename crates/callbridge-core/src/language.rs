//! **Language policy** — locale fallback chain, transcript language detection,
//! and stop-phrase matching for the bilingual (Bengali/English) agent.
//!
//! Recognition is attempted against a regional locale first; on no-match or
//! timeout the chain falls back to the generic variant of the same language,
//! then to the alternate language, then restarts in the default order.

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};

/// A supported conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lang {
    Bengali,
    English,
}

impl Lang {
    /// ISO 639-1 code ("bn" / "en").
    pub fn code(self) -> &'static str {
        match self {
            Self::Bengali => "bn",
            Self::English => "en",
        }
    }

    /// The other supported language.
    pub fn alternate(self) -> Lang {
        match self {
            Self::Bengali => Self::English,
            Self::English => Self::Bengali,
        }
    }
}

/// A recognition/synthesis locale. Regional variants are preferred; the
/// generic variants exist only as fallback steps in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    BengaliBd,
    Bengali,
    EnglishUs,
    English,
}

impl Locale {
    /// BCP 47 tag handed to the speech engines.
    pub fn tag(self) -> &'static str {
        match self {
            Self::BengaliBd => "bn-BD",
            Self::Bengali => "bn",
            Self::EnglishUs => "en-US",
            Self::English => "en",
        }
    }

    /// Language this locale belongs to.
    pub fn lang(self) -> Lang {
        match self {
            Self::BengaliBd | Self::Bengali => Lang::Bengali,
            Self::EnglishUs | Self::English => Lang::English,
        }
    }

    /// Regional variant of a language (first choice for recognition).
    pub fn regional(lang: Lang) -> Locale {
        match lang {
            Lang::Bengali => Self::BengaliBd,
            Lang::English => Self::EnglishUs,
        }
    }

    /// Generic (non-regional) variant of a language.
    pub fn generic(lang: Lang) -> Locale {
        match lang {
            Lang::Bengali => Self::Bengali,
            Lang::English => Self::English,
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// User preference for the conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguagePreference {
    /// Detect per transcript, with the fallback chain for recognition.
    Auto,
    /// Pin one language; no fallback chain.
    Fixed(Lang),
}

/// Default language on the very first turn of an Auto session.
pub const DEFAULT_PRIMARY: Lang = Lang::Bengali;

/// Romanized Bengali function words used to disambiguate Latin-script
/// transcripts. Two or more hits classify the transcript as Bengali.
const ROMANIZED_BENGALI: &[&str] = &[
    "ami", "tumi", "apni", "keno", "kemon", "bhalo", "achen", "acho", "achi",
    "kothay", "kichu", "onek", "hobe", "korbo", "bolun", "dhonnobad",
];

/// Stop phrases per language, matched as lowercase substrings.
const STOP_PHRASES: &[&str] = &["stop", "বন্ধ", "থাম"];

/// Resolves which locale to request for each listen attempt and detects the
/// language of completed transcripts.
#[derive(Debug, Clone)]
pub struct LanguageResolver {
    preference: LanguagePreference,
    active: Lang,
}

impl LanguageResolver {
    /// Build a resolver for the given preference. `available` is the set of
    /// languages the speech engine reports as installed; an empty set is a
    /// fatal error the orchestrator surfaces as a Stop.
    pub fn new(preference: LanguagePreference, available: &[Lang]) -> AgentResult<Self> {
        if available.is_empty() {
            return Err(AgentError::Language(
                "speech engine reports no supported languages".to_string(),
            ));
        }
        let active = match preference {
            LanguagePreference::Fixed(lang) => lang,
            LanguagePreference::Auto => {
                if available.contains(&DEFAULT_PRIMARY) {
                    DEFAULT_PRIMARY
                } else {
                    available[0]
                }
            }
        };
        Ok(Self { preference, active })
    }

    /// The language currently used for TTS and as the first listen choice.
    pub fn active(&self) -> Lang {
        self.active
    }

    /// Locale to request for the given 0-based attempt within one turn.
    ///
    /// Auto chain: regional(active) → generic(active) → regional(alternate);
    /// past that the default-order chain is walked once more. Fixed
    /// preference always yields the regional variant, no chain.
    pub fn locale_for_attempt(&self, attempt: u32) -> Locale {
        match self.preference {
            LanguagePreference::Fixed(lang) => Locale::regional(lang),
            LanguagePreference::Auto => {
                let (lang, step) = if attempt < 3 {
                    (self.active, attempt)
                } else {
                    // Chain exhausted: restart in the default order.
                    (DEFAULT_PRIMARY, (attempt - 3) % 3)
                };
                match step {
                    0 => Locale::regional(lang),
                    1 => Locale::generic(lang),
                    _ => Locale::regional(lang.alternate()),
                }
            }
        }
    }

    /// Record a completed transcript: detects its language and makes that the
    /// active language for the next utterance and listen attempt.
    pub fn observe_transcript(&mut self, text: &str) -> Lang {
        if let LanguagePreference::Fixed(lang) = self.preference {
            self.active = lang;
            return lang;
        }
        let detected = detect_language(text);
        self.active = detected;
        detected
    }

    /// True when the transcript contains a stop phrase in any supported
    /// language.
    pub fn is_stop_phrase(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        STOP_PHRASES.iter().any(|p| lower.contains(p))
    }
}

/// Detect the transcript language. Bengali-script characters win outright;
/// Latin-script text is classified by the romanized function-word lexicon.
pub fn detect_language(text: &str) -> Lang {
    if text.chars().any(is_bengali_script) {
        return Lang::Bengali;
    }
    let hits = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| ROMANIZED_BENGALI.contains(&w.as_str()))
        .count();
    if hits >= 2 {
        Lang::Bengali
    } else {
        Lang::English
    }
}

fn is_bengali_script(c: char) -> bool {
    ('\u{0980}'..='\u{09FF}').contains(&c)
}
