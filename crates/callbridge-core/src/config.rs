//! Agent configuration: a TOML file (`agent_config.toml`) with environment
//! overrides, so behavior changes without code edits.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | CALLBRIDGE_API_KEY / GROQ_API_KEY | — | Backend bearer key. |
//! | CALLBRIDGE_MODEL | llama-3.1-8b-instant | Chat model. |
//! | CALLBRIDGE_API_URL | Groq OpenAI-compatible base | Backend base URL. |
//! | CALLBRIDGE_LANGUAGE | auto | "auto" \| "bn" \| "en". |
//! | CALLBRIDGE_AUTO_ANSWER | true | Answer ringing calls automatically. |
//! | CALLBRIDGE_MAX_CALL_MINUTES | 10 | Duration guard hard limit. |

use crate::error::{AgentError, AgentResult};
use crate::language::{Lang, LanguagePreference};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_true() -> bool {
    true
}

/// Backend (chat-completion) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Bearer key. Usually left unset here and provided via env.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat model override.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible).
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

fn default_read_timeout_ms() -> u64 {
    20_000
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            api_url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Retry settings for the backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_retry_multiplier() -> u32 {
    2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_retry_base_ms(),
            multiplier: default_retry_multiplier(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Duration guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    #[serde(default = "default_warning_minutes")]
    pub warning_minutes: u64,
    #[serde(default = "default_max_call_minutes")]
    pub max_call_minutes: u64,
    #[serde(default = "default_guard_tick_secs")]
    pub tick_secs: u64,
}

fn default_warning_minutes() -> u64 {
    8
}

fn default_max_call_minutes() -> u64 {
    10
}

fn default_guard_tick_secs() -> u64 {
    60
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            warning_minutes: default_warning_minutes(),
            max_call_minutes: default_max_call_minutes(),
            tick_secs: default_guard_tick_secs(),
        }
    }
}

/// Speech capture/synthesis timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Hard bound per listen attempt; capture is force-cancelled after this.
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Settle delay between speech ending and the next listen.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Delay before re-listening with the next locale in the chain.
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
    /// Delay before re-listening after a recognizer-busy error.
    #[serde(default = "default_busy_retry_delay_ms")]
    pub busy_retry_delay_ms: u64,
    /// Delay before re-listening after the spoken apology.
    #[serde(default = "default_apology_relisten_ms")]
    pub apology_relisten_ms: u64,
}

fn default_listen_timeout_ms() -> u64 {
    6000
}

fn default_min_speech_ms() -> u64 {
    1500
}

fn default_silence_timeout_ms() -> u64 {
    3000
}

fn default_max_results() -> u32 {
    3
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_fallback_delay_ms() -> u64 {
    300
}

fn default_busy_retry_delay_ms() -> u64 {
    1000
}

fn default_apology_relisten_ms() -> u64 {
    2000
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            listen_timeout_ms: default_listen_timeout_ms(),
            min_speech_ms: default_min_speech_ms(),
            silence_timeout_ms: default_silence_timeout_ms(),
            max_results: default_max_results(),
            settle_delay_ms: default_settle_delay_ms(),
            fallback_delay_ms: default_fallback_delay_ms(),
            busy_retry_delay_ms: default_busy_retry_delay_ms(),
            apology_relisten_ms: default_apology_relisten_ms(),
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub guard: GuardSettings,
    #[serde(default)]
    pub speech: SpeechSettings,
    /// "auto" | "bn" | "en".
    #[serde(default)]
    pub language: Option<String>,
    /// Answer ringing calls without user confirmation.
    #[serde(default = "default_true")]
    pub auto_answer: bool,
}

impl AgentConfig {
    /// Default path for the configuration file.
    pub fn default_path() -> PathBuf {
        PathBuf::from("agent_config.toml")
    }

    /// Load from the default path (creating a default file on first run),
    /// then apply environment overrides.
    pub fn load() -> AgentResult<Self> {
        let mut config = Self::load_from_path(&Self::default_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Load from a specific path; a missing file is created with defaults.
    pub fn load_from_path(path: &Path) -> AgentResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| AgentError::Config(e.to_string()))
        } else {
            let config = Self {
                auto_answer: true,
                ..Default::default()
            };
            config.save_to_path(path)?;
            Ok(config)
        }
    }

    /// Save to a specific path, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> AgentResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AgentError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `CALLBRIDGE_*` environment overrides on top of the file.
    pub fn apply_env(&mut self) {
        if let Some(key) = env_opt_string("CALLBRIDGE_API_KEY")
            .or_else(|| env_opt_string("GROQ_API_KEY"))
        {
            self.backend.api_key = Some(key);
        }
        if let Some(model) = env_opt_string("CALLBRIDGE_MODEL") {
            self.backend.model = Some(model);
        }
        if let Some(url) = env_opt_string("CALLBRIDGE_API_URL") {
            self.backend.api_url = Some(url);
        }
        if let Some(lang) = env_opt_string("CALLBRIDGE_LANGUAGE") {
            self.language = Some(lang);
        }
        self.auto_answer = env_bool("CALLBRIDGE_AUTO_ANSWER", self.auto_answer);
        if let Some(mins) = env_opt_string("CALLBRIDGE_MAX_CALL_MINUTES")
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.guard.max_call_minutes = mins.max(1);
        }
    }

    /// Language preference parsed from the `language` field. Unknown values
    /// fall back to Auto.
    pub fn language_preference(&self) -> LanguagePreference {
        match self.language.as_deref().map(str::trim) {
            Some("bn") => LanguagePreference::Fixed(Lang::Bengali),
            Some("en") => LanguagePreference::Fixed(Lang::English),
            _ => LanguagePreference::Auto,
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
