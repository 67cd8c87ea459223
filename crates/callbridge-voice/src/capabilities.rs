//! Device capability seams: speech capture, speech synthesis, call control,
//! audio routing, and connectivity.
//!
//! The engine only ever talks to these traits. Real backends (platform speech
//! services, telephony stacks) implement them out of tree; the `Placeholder*`
//! implementations here are scriptable stand-ins for wiring and tests.

use async_trait::async_trait;
use callbridge_core::{AgentError, AgentResult, Lang, ListenOutcome, Locale, SpeakOutcome};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Parameters for one listen attempt.
#[derive(Debug, Clone)]
pub struct ListenRequest {
    pub locale: Locale,
    pub max_results: u32,
    pub min_speech: Duration,
    pub silence_timeout: Duration,
}

/// Speech-to-text capture. One attempt at a time; `cancel` must make any
/// in-flight `listen` return promptly.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    /// Languages the engine reports as installed.
    fn supported_languages(&self) -> Vec<Lang> {
        vec![Lang::Bengali, Lang::English]
    }

    async fn listen(&self, request: ListenRequest) -> AgentResult<ListenOutcome>;

    async fn cancel(&self);
}

/// Text-to-speech synthesis. `speak` resolves when playback finishes.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    fn is_ready(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str, locale: Locale) -> SpeakOutcome;

    async fn cancel(&self);
}

/// Telephony accept hooks, ordered from most to least reliable. Each returns
/// `Ok(true)` when the call went off-hook, `Ok(false)` when the mechanism is
/// unavailable or declined, and `Err` only for unexpected platform failures.
#[async_trait]
pub trait CallAnswerCapability: Send + Sync {
    async fn line_is_ringing(&self) -> bool;

    /// Native telecom accept. Only valid while the line is ringing.
    async fn try_native_accept(&self) -> AgentResult<bool>;

    /// Broadcast-style answer action.
    async fn try_answer_action(&self) -> AgentResult<bool>;

    /// Headset-hook key injection. Last resort.
    async fn try_key_injection(&self) -> AgentResult<bool>;
}

/// Call audio routing (speakerphone / in-call audio mode).
#[async_trait]
pub trait AudioRoute: Send + Sync {
    async fn engage(&self) -> AgentResult<()>;

    async fn release(&self);
}

/// Network reachability probe.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Counts concurrent holders of the audio pipeline. Shared between a
/// placeholder capture and synthesis pair to verify the engine never overlaps
/// them.
#[derive(Debug, Default)]
pub struct AudioBusyProbe {
    active: AtomicU8,
    peak: AtomicU8,
}

impl AudioBusyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneous capture/synthesis holders observed.
    pub fn peak(&self) -> u8 {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Scripted capture: pops one outcome per listen attempt and records the
/// locale that was requested.
#[derive(Default)]
pub struct PlaceholderCapture {
    outcomes: Mutex<VecDeque<ListenOutcome>>,
    requests: Mutex<Vec<ListenRequest>>,
    latency: Option<Duration>,
    probe: Option<Arc<AudioBusyProbe>>,
    cancelled: AtomicU32,
}

impl PlaceholderCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcomes to hand back, in order. An exhausted queue yields
    /// `Timeout`.
    pub fn script(outcomes: impl IntoIterator<Item = ListenOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_probe(mut self, probe: Arc<AudioBusyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Locales requested so far, in order.
    pub fn requested_locales(&self) -> Vec<Locale> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.locale).collect())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechCapture for PlaceholderCapture {
    async fn listen(&self, request: ListenRequest) -> AgentResult<ListenOutcome> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request);
        }
        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let outcome = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(ListenOutcome::Timeout);
        if let Some(probe) = &self.probe {
            probe.leave();
        }
        Ok(outcome)
    }

    async fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted synthesis: records everything spoken, optionally with a scripted
/// failure queue.
#[derive(Default)]
pub struct PlaceholderSynthesis {
    spoken: Mutex<Vec<(String, Locale)>>,
    failures: Mutex<VecDeque<SpeakOutcome>>,
    latency: Option<Duration>,
    probe: Option<Arc<AudioBusyProbe>>,
    cancelled: AtomicU32,
}

impl PlaceholderSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_probe(mut self, probe: Arc<AudioBusyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Queue outcomes for upcoming speak calls; exhausted queue means `Done`.
    pub fn script_outcomes(&self, outcomes: impl IntoIterator<Item = SpeakOutcome>) {
        if let Ok(mut q) = self.failures.lock() {
            q.extend(outcomes);
        }
    }

    /// Every utterance spoken so far, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|s| s.iter().map(|(text, _)| text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn spoken_locales(&self) -> Vec<Locale> {
        self.spoken
            .lock()
            .map(|s| s.iter().map(|(_, locale)| *locale).collect())
            .unwrap_or_default()
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesis for PlaceholderSynthesis {
    async fn speak(&self, text: &str, locale: Locale) -> SpeakOutcome {
        if let Ok(mut log) = self.spoken.lock() {
            log.push((text.to_string(), locale));
        }
        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(probe) = &self.probe {
            probe.leave();
        }
        self.failures
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(SpeakOutcome::Done)
    }

    async fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted behavior of one answer mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismScript {
    /// The mechanism answers the call.
    Answers,
    /// The mechanism runs but does not take the call off-hook.
    Declines,
    /// The mechanism errors out.
    Fails,
}

impl MechanismScript {
    fn run(self) -> AgentResult<bool> {
        match self {
            Self::Answers => Ok(true),
            Self::Declines => Ok(false),
            Self::Fails => Err(AgentError::CallAnswerFailed),
        }
    }
}

/// Scripted telephony accept hooks.
pub struct PlaceholderAnswer {
    ringing: AtomicBool,
    native: MechanismScript,
    action: MechanismScript,
    key: MechanismScript,
    native_calls: AtomicU32,
    action_calls: AtomicU32,
    key_calls: AtomicU32,
}

impl PlaceholderAnswer {
    pub fn script(native: MechanismScript, action: MechanismScript, key: MechanismScript) -> Self {
        Self {
            ringing: AtomicBool::new(true),
            native,
            action,
            key,
            native_calls: AtomicU32::new(0),
            action_calls: AtomicU32::new(0),
            key_calls: AtomicU32::new(0),
        }
    }

    pub fn set_ringing(&self, ringing: bool) {
        self.ringing.store(ringing, Ordering::SeqCst);
    }

    /// Calls per mechanism: (native, action, key).
    pub fn call_counts(&self) -> (u32, u32, u32) {
        (
            self.native_calls.load(Ordering::SeqCst),
            self.action_calls.load(Ordering::SeqCst),
            self.key_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl CallAnswerCapability for PlaceholderAnswer {
    async fn line_is_ringing(&self) -> bool {
        self.ringing.load(Ordering::SeqCst)
    }

    async fn try_native_accept(&self) -> AgentResult<bool> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        self.native.run()
    }

    async fn try_answer_action(&self) -> AgentResult<bool> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        self.action.run()
    }

    async fn try_key_injection(&self) -> AgentResult<bool> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        self.key.run()
    }
}

/// Counting audio route.
#[derive(Debug, Default)]
pub struct PlaceholderRoute {
    engaged: AtomicU32,
    released: AtomicU32,
}

impl PlaceholderRoute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage_count(&self) -> u32 {
        self.engaged.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u32 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioRoute for PlaceholderRoute {
    async fn engage(&self) -> AgentResult<()> {
        self.engaged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed connectivity probe.
#[derive(Debug)]
pub struct PlaceholderConnectivity {
    online: AtomicBool,
}

impl PlaceholderConnectivity {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for PlaceholderConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
