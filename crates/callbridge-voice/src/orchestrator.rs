//! Conversation engine: the single event loop that sequences listening,
//! thinking, and speaking over the capability seams.
//!
//! All capability work runs in spawned tasks that report back over one mpsc
//! channel, so the loop itself never blocks and exactly one of capture or
//! synthesis holds the audio pipeline at a time. Completions are tagged with
//! the session epoch; anything from a previous session is discarded.

use crate::answer::CallAnswerStrategy;
use crate::capabilities::{
    AudioRoute, CallAnswerCapability, Connectivity, ListenRequest, SpeechCapture,
    SpeechSynthesis,
};
use crate::guard::{DurationGuard, GuardConfig, GuardEvent};
use crate::line::{masked_number, LineEvent};
use crate::status::StatusSnapshot;
use callbridge_core::{
    prompts, AgentConfig, BackendError, BackendRequest, CallContext, ChatBackend,
    ConversationSession, Lang, LanguagePreference, LanguageResolver, ListenOutcome, Locale,
    RetryDecision, RetryPolicy, SessionState, SpeakOutcome, SpeechSettings, SpeechTurn,
    DEFAULT_PRIMARY,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Engine tuning, usually derived from [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub speech: SpeechSettings,
    pub guard: GuardConfig,
    pub retry: RetryPolicy,
    pub language: LanguagePreference,
    pub auto_answer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speech: SpeechSettings::default(),
            guard: GuardConfig::default(),
            retry: RetryPolicy::default(),
            language: LanguagePreference::Auto,
            auto_answer: true,
        }
    }
}

impl From<&AgentConfig> for EngineConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            speech: config.speech.clone(),
            guard: GuardConfig::from(&config.guard),
            retry: config.retry.policy(),
            language: config.language_preference(),
            auto_answer: config.auto_answer,
        }
    }
}

/// The capability set the engine drives. All trait objects so hosts can mix
/// real adapters with placeholders.
#[derive(Clone)]
pub struct Capabilities {
    pub capture: Arc<dyn SpeechCapture>,
    pub synthesis: Arc<dyn SpeechSynthesis>,
    pub answer: Arc<dyn CallAnswerCapability>,
    pub route: Arc<dyn AudioRoute>,
    pub connectivity: Arc<dyn Connectivity>,
    pub backend: Arc<dyn ChatBackend>,
}

/// How a session came to exist.
#[derive(Debug, Clone)]
pub enum SessionOrigin {
    TapToStart,
    IncomingCall(CallContext),
}

/// What to do once the current utterance finishes playing.
#[derive(Debug, Clone)]
enum AfterSpeech {
    Listen { delay: Duration },
    /// End the session; `failed` marks endings caused by an unrecoverable
    /// error rather than a normal goodbye.
    Stop { failed: bool },
}

enum Event {
    Start(SessionOrigin),
    Stop,
    Line(LineEvent),
    ListenNow {
        epoch: u64,
    },
    ListenDone {
        epoch: u64,
        turn: SpeechTurn,
    },
    SpeakDone {
        epoch: u64,
        outcome: SpeakOutcome,
        after: AfterSpeech,
    },
    BackendDone {
        epoch: u64,
        request: BackendRequest,
        result: Result<String, BackendError>,
    },
    BackendRetry {
        epoch: u64,
        request: BackendRequest,
    },
    Guard {
        epoch: u64,
        event: GuardEvent,
    },
}

/// Cloneable control surface for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<StatusSnapshot>,
}

impl EngineHandle {
    /// Start a session from a user action (no call context).
    pub fn start(&self) {
        let _ = self.tx.send(Event::Start(SessionOrigin::TapToStart));
    }

    /// Start a session bridged from an already-answered call.
    pub fn start_for_call(&self, context: CallContext) {
        let _ = self
            .tx
            .send(Event::Start(SessionOrigin::IncomingCall(context)));
    }

    /// End the active session, if any. Idempotent.
    pub fn stop(&self) {
        let _ = self.tx.send(Event::Stop);
    }

    /// Forward a telephony event from the host.
    pub fn line_event(&self, event: LineEvent) {
        let _ = self.tx.send(Event::Line(event));
    }

    /// Latest status snapshot.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// The conversation engine. Create with [`ConversationEngine::spawn`]; all
/// interaction goes through the returned [`EngineHandle`].
pub struct ConversationEngine {
    config: EngineConfig,
    caps: Capabilities,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    status_tx: watch::Sender<StatusSnapshot>,
    /// Bumped on every session start and end; events tagged with an older
    /// epoch are stale and dropped.
    epoch: u64,
    session: Option<ConversationSession>,
    resolver: Option<LanguageResolver>,
    /// 0-based position in the locale fallback chain for the current turn.
    listen_attempt: u32,
    guard: Option<DurationGuard>,
    /// Set while a terminal utterance (farewell, apology-and-stop) plays;
    /// suppresses turn progress so nothing restarts the loop underneath it.
    winding_down: bool,
    last_transcript: Option<String>,
    last_reply: Option<String>,
}

impl ConversationEngine {
    /// Spawn the engine loop onto the current runtime.
    pub fn spawn(config: EngineConfig, caps: Capabilities) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::idle());
        let handle = EngineHandle {
            tx: tx.clone(),
            status: status_rx,
        };
        let engine = Self {
            config,
            caps,
            tx,
            rx,
            status_tx,
            epoch: 0,
            session: None,
            resolver: None,
            listen_attempt: 0,
            guard: None,
            winding_down: false,
            last_transcript: None,
            last_reply: None,
        };
        let task = tokio::spawn(engine.run());
        (handle, task)
    }

    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.handle(event).await;
        }
        debug!("engine event loop ended");
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Start(origin) => self.on_start(origin).await,
            Event::Stop => self.finish_session("stop requested", false).await,
            Event::Line(line) => self.on_line(line).await,
            Event::ListenNow { epoch } => {
                if self.is_current(epoch) && !self.winding_down {
                    self.begin_listen();
                }
            }
            Event::ListenDone { epoch, turn } => {
                if self.is_current(epoch) && !self.winding_down {
                    self.on_listen_done(turn).await;
                }
            }
            Event::SpeakDone {
                epoch,
                outcome,
                after,
            } => {
                if self.is_current(epoch) {
                    self.on_speak_done(outcome, after).await;
                }
            }
            Event::BackendDone {
                epoch,
                request,
                result,
            } => {
                if self.is_current(epoch) && !self.winding_down {
                    self.on_backend_done(request, result);
                }
            }
            Event::BackendRetry { epoch, request } => {
                if self.is_current(epoch) && !self.winding_down {
                    self.query_backend(request);
                }
            }
            Event::Guard { epoch, event } => {
                if self.is_current(epoch) && !self.winding_down {
                    self.on_guard(event).await;
                }
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.session.is_some()
    }

    async fn on_start(&mut self, origin: SessionOrigin) {
        if self.session.is_some() {
            warn!("start ignored: a session is already active");
            return;
        }
        if !self.caps.capture.is_ready() || !self.caps.synthesis.is_ready() {
            warn!("start rejected: speech engines not ready");
            self.status_tx.send_replace(StatusSnapshot::error());
            return;
        }
        if !self.caps.connectivity.is_online().await {
            warn!("start rejected: no connectivity");
            self.status_tx.send_replace(StatusSnapshot::error());
            return;
        }
        let available = self.caps.capture.supported_languages();
        let resolver = match LanguageResolver::new(self.config.language, &available) {
            Ok(resolver) => resolver,
            Err(e) => {
                error!("cannot start session: {e}");
                self.status_tx.send_replace(StatusSnapshot::error());
                return;
            }
        };

        self.epoch += 1;
        let call_context = match origin {
            SessionOrigin::TapToStart => None,
            SessionOrigin::IncomingCall(context) => Some(context),
        };
        let on_call = call_context.is_some();
        let session =
            ConversationSession::new(self.config.language, resolver.active(), call_context);
        info!(session_id = %session.id, on_call, "conversation session starting");
        self.session = Some(session);
        self.resolver = Some(resolver);
        self.listen_attempt = 0;
        self.winding_down = false;
        self.last_transcript = None;
        self.last_reply = None;
        self.publish();

        // In-call audio must be routed before anything is spoken.
        if let Err(e) = self.caps.route.engage().await {
            warn!("audio route engage failed: {e}");
        }

        let (guard, mut guard_rx) = DurationGuard::start(self.config.guard.clone());
        self.guard = Some(guard);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            while let Some(event) = guard_rx.recv().await {
                if tx.send(Event::Guard { epoch, event }).is_err() {
                    break;
                }
            }
        });

        let greeting = if on_call {
            prompts::greeting_incoming_call()
        } else {
            prompts::greeting_tap_to_start()
        };
        self.speak(
            greeting.to_string(),
            AfterSpeech::Listen {
                delay: self.settle_delay(),
            },
        );
    }

    async fn on_line(&mut self, event: LineEvent) {
        match event {
            LineEvent::Ringing { number } => {
                if !self.config.auto_answer {
                    debug!("incoming call ignored: auto-answer disabled");
                    return;
                }
                if self.session.is_some() {
                    warn!("incoming call ignored: session already active");
                    return;
                }
                info!(number = %masked_number(&number), "incoming call, answering");
                let answer = self.caps.answer.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    match CallAnswerStrategy::answer(answer.as_ref()).await {
                        Ok(outcome) => info!(mechanism = ?outcome.mechanism, "call answered"),
                        // The user may have picked up by hand; run the
                        // conversation regardless.
                        Err(e) => warn!("all answer mechanisms failed: {e}"),
                    }
                    let context = CallContext::new(number);
                    let _ = tx.send(Event::Start(SessionOrigin::IncomingCall(context)));
                });
            }
            LineEvent::Answered => debug!("line reported off-hook"),
            LineEvent::Ended => {
                let on_call = self
                    .session
                    .as_ref()
                    .map(|s| s.is_call())
                    .unwrap_or(false);
                if on_call {
                    self.finish_session("call ended", false).await;
                }
            }
        }
    }

    fn speak(&mut self, text: String, after: AfterSpeech) {
        if matches!(after, AfterSpeech::Stop { .. }) {
            self.winding_down = true;
        }
        self.set_state(SessionState::Speaking);
        let locale = Locale::regional(self.active_lang());
        let synthesis = self.caps.synthesis.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = synthesis.speak(&text, locale).await;
            let _ = tx.send(Event::SpeakDone {
                epoch,
                outcome,
                after,
            });
        });
    }

    async fn on_speak_done(&mut self, outcome: SpeakOutcome, after: AfterSpeech) {
        if let SpeakOutcome::Error(e) = outcome {
            // A broken utterance is not fatal; keep the turn cycle moving.
            warn!("synthesis failed: {e}");
        }
        match after {
            AfterSpeech::Stop { failed } => {
                self.finish_session("terminal utterance finished", failed).await;
            }
            AfterSpeech::Listen { delay } => {
                // An earlier utterance may finish while the farewell is
                // already playing; it must not restart capture.
                if self.winding_down {
                    debug!("listen suppressed: a terminal utterance is playing");
                } else {
                    self.schedule_listen(delay);
                }
            }
        }
    }

    fn schedule_listen(&mut self, delay: Duration) {
        if delay.is_zero() {
            self.begin_listen();
            return;
        }
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::ListenNow { epoch });
        });
    }

    fn begin_listen(&mut self) {
        let Some(resolver) = self.resolver.as_ref() else {
            return;
        };
        let locale = resolver.locale_for_attempt(self.listen_attempt);
        debug!(attempt = self.listen_attempt, %locale, "listening");
        self.set_state(SessionState::Listening);
        let turn = SpeechTurn::pending(locale, self.listen_attempt);
        let request = ListenRequest {
            locale,
            max_results: self.config.speech.max_results,
            min_speech: Duration::from_millis(self.config.speech.min_speech_ms),
            silence_timeout: Duration::from_millis(self.config.speech.silence_timeout_ms),
        };
        let capture = self.caps.capture.clone();
        let hard_timeout = Duration::from_millis(self.config.speech.listen_timeout_ms);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(hard_timeout, capture.listen(request)).await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!("capture error: {e}");
                    ListenOutcome::Other(-1)
                }
                Err(_) => {
                    // The engine never heard back: reclaim the recognizer.
                    capture.cancel().await;
                    ListenOutcome::Timeout
                }
            };
            let _ = tx.send(Event::ListenDone {
                epoch,
                turn: turn.completed(outcome),
            });
        });
    }

    async fn on_listen_done(&mut self, turn: SpeechTurn) {
        match turn.outcome {
            ListenOutcome::Pending => {}
            ListenOutcome::Transcript(text) => self.on_transcript(text).await,
            ListenOutcome::NoMatch | ListenOutcome::Timeout => {
                // Next locale in the fallback chain.
                debug!(
                    locale = %turn.locale_attempted,
                    attempt = turn.attempt_index,
                    "nothing recognized, falling back"
                );
                self.listen_attempt += 1;
                self.schedule_listen(Duration::from_millis(
                    self.config.speech.fallback_delay_ms,
                ));
            }
            ListenOutcome::Busy => {
                debug!("recognizer busy, retrying shortly");
                self.listen_attempt = 0;
                self.schedule_listen(Duration::from_millis(
                    self.config.speech.busy_retry_delay_ms,
                ));
            }
            ListenOutcome::NetworkLoss => {
                warn!("connectivity lost during capture");
                let lang = self.active_lang();
                self.speak(
                    prompts::network_lost(lang).to_string(),
                    AfterSpeech::Stop { failed: true },
                );
            }
            ListenOutcome::Other(code) => {
                warn!(
                    code,
                    locale = %turn.locale_attempted,
                    "capture reported an engine error, retrying"
                );
                self.listen_attempt = 0;
                self.schedule_listen(Duration::from_millis(
                    self.config.speech.busy_retry_delay_ms,
                ));
            }
        }
    }

    async fn on_transcript(&mut self, text: String) {
        let Some(resolver) = self.resolver.as_mut() else {
            return;
        };
        self.last_transcript = Some(text.clone());
        if resolver.is_stop_phrase(&text) {
            info!("stop phrase heard, ending session");
            let lang = resolver.active();
            self.speak(
                prompts::farewell(lang).to_string(),
                AfterSpeech::Stop { failed: false },
            );
            return;
        }
        let lang = resolver.observe_transcript(&text);
        if let Some(session) = self.session.as_mut() {
            session.active_language = lang;
        }
        self.listen_attempt = 0;

        if !self.caps.connectivity.is_online().await {
            warn!("offline, backend unreachable");
            self.speak(
                prompts::network_lost(lang).to_string(),
                AfterSpeech::Stop { failed: true },
            );
            return;
        }
        self.query_backend(BackendRequest::first(text, lang));
    }

    fn query_backend(&mut self, request: BackendRequest) {
        self.set_state(SessionState::Thinking);
        if let Some(session) = self.session.as_mut() {
            session.retry_count = request.attempt.saturating_sub(1);
        }
        let backend = self.caps.backend.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let system = prompts::system_prompt(request.language);
            let result = backend.complete(system, &request.prompt).await;
            let _ = tx.send(Event::BackendDone {
                epoch,
                request,
                result,
            });
        });
    }

    fn on_backend_done(
        &mut self,
        request: BackendRequest,
        result: Result<String, BackendError>,
    ) {
        match result {
            Ok(reply) => {
                if let Some(session) = self.session.as_mut() {
                    session.retry_count = 0;
                }
                self.last_reply = Some(reply.clone());
                self.speak(
                    reply,
                    AfterSpeech::Listen {
                        delay: self.settle_delay(),
                    },
                );
            }
            Err(error) => {
                warn!(attempt = request.attempt, "backend attempt failed: {error}");
                match self.config.retry.should_retry(request.attempt, &error) {
                    RetryDecision::Retry { after } => {
                        let next = request.next();
                        let tx = self.tx.clone();
                        let epoch = self.epoch;
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = tx.send(Event::BackendRetry {
                                epoch,
                                request: next,
                            });
                        });
                    }
                    RetryDecision::GiveUp => {
                        let lang = self.active_lang();
                        if error.is_fatal() {
                            error!("backend can never succeed, ending session: {error}");
                            self.speak(
                                prompts::configuration_error(lang).to_string(),
                                AfterSpeech::Stop { failed: true },
                            );
                        } else {
                            info!("backend retries exhausted, apologizing");
                            self.listen_attempt = 0;
                            self.speak(
                                prompts::apology(lang).to_string(),
                                AfterSpeech::Listen {
                                    delay: Duration::from_millis(
                                        self.config.speech.apology_relisten_ms,
                                    ),
                                },
                            );
                        }
                    }
                }
            }
        }
    }

    async fn on_guard(&mut self, event: GuardEvent) {
        match event {
            GuardEvent::Warning { remaining } => {
                warn!(
                    remaining_secs = remaining.as_secs(),
                    "call approaching the duration limit"
                );
            }
            GuardEvent::Expired => {
                info!("duration limit reached, saying goodbye");
                // Whatever is in flight loses the audio pipeline now.
                self.caps.capture.cancel().await;
                self.caps.synthesis.cancel().await;
                let lang = self.active_lang();
                self.speak(
                    prompts::farewell(lang).to_string(),
                    AfterSpeech::Stop { failed: false },
                );
            }
        }
    }

    async fn finish_session(&mut self, reason: &str, failed: bool) {
        if self.session.is_none() {
            debug!("stop ignored: no active session");
            return;
        }
        info!(reason, failed, "conversation session ending");
        // Everything still in flight is now stale.
        self.epoch += 1;
        self.caps.capture.cancel().await;
        self.caps.synthesis.cancel().await;
        if let Some(mut guard) = self.guard.take() {
            guard.stop();
        }
        self.caps.route.release().await;
        if let Some(session) = self.session.as_mut() {
            session.state = SessionState::Stopped;
        }
        self.session = None;
        self.resolver = None;
        self.listen_attempt = 0;
        self.winding_down = false;
        self.last_transcript = None;
        self.last_reply = None;
        let last = if failed {
            StatusSnapshot::error()
        } else {
            StatusSnapshot::idle()
        };
        self.status_tx.send_replace(last);
    }

    fn set_state(&mut self, state: SessionState) {
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = match self.session.as_ref() {
            Some(session) => StatusSnapshot::of(session)
                .with_exchange(self.last_transcript.clone(), self.last_reply.clone()),
            None => StatusSnapshot::idle(),
        };
        self.status_tx.send_replace(snapshot);
    }

    fn active_lang(&self) -> Lang {
        self.resolver
            .as_ref()
            .map(|r| r.active())
            .unwrap_or(DEFAULT_PRIMARY)
    }

    fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.config.speech.settle_delay_ms)
    }
}
