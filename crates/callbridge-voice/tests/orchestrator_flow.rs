//! End-to-end engine flows against scripted capabilities. Everything runs on
//! the paused tokio clock, so delays and the duration guard are deterministic.

use async_trait::async_trait;
use callbridge_core::{
    prompts, BackendError, ChatBackend, Lang, ListenOutcome, Locale, RetryPolicy, SpeechSettings,
};
use callbridge_voice::{
    AudioBusyProbe, Capabilities, ConversationEngine, EngineConfig, EngineHandle, GuardConfig,
    LineEvent, MechanismScript, PlaceholderAnswer, PlaceholderCapture, PlaceholderConnectivity,
    PlaceholderRoute, PlaceholderSynthesis, StateLabel, StatusSnapshot,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Chat backend with a scripted result per call. An exhausted queue keeps
/// returning rate limits.
struct ScriptedBackend {
    results: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: AtomicU32,
}

impl ScriptedBackend {
    fn new(results: impl IntoIterator<Item = Result<String, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(BackendError::RateLimited))
    }
}

struct Rig {
    capture: Arc<PlaceholderCapture>,
    synthesis: Arc<PlaceholderSynthesis>,
    answer: Arc<PlaceholderAnswer>,
    route: Arc<PlaceholderRoute>,
    connectivity: Arc<PlaceholderConnectivity>,
}

impl Rig {
    fn new(capture: PlaceholderCapture) -> Self {
        Self {
            capture: Arc::new(capture),
            synthesis: Arc::new(PlaceholderSynthesis::new()),
            answer: Arc::new(PlaceholderAnswer::script(
                MechanismScript::Answers,
                MechanismScript::Answers,
                MechanismScript::Answers,
            )),
            route: Arc::new(PlaceholderRoute::new()),
            connectivity: Arc::new(PlaceholderConnectivity::online()),
        }
    }

    fn capabilities(&self, backend: Arc<dyn ChatBackend>) -> Capabilities {
        Capabilities {
            capture: self.capture.clone(),
            synthesis: self.synthesis.clone(),
            answer: self.answer.clone(),
            route: self.route.clone(),
            connectivity: self.connectivity.clone(),
            backend,
        }
    }
}

/// Speech settings with millisecond-scale delays so flows finish fast.
fn fast_speech() -> SpeechSettings {
    SpeechSettings {
        listen_timeout_ms: 500,
        settle_delay_ms: 10,
        fallback_delay_ms: 10,
        busy_retry_delay_ms: 10,
        apology_relisten_ms: 10,
        ..SpeechSettings::default()
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        speech: fast_speech(),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            multiplier: 2,
        },
        ..EngineConfig::default()
    }
}

async fn wait_for(
    status: &mut watch::Receiver<StatusSnapshot>,
    what: &str,
    pred: impl Fn(&StatusSnapshot) -> bool,
) {
    let result = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if pred(&status.borrow()) {
                return;
            }
            if status.changed().await.is_err() {
                panic!("status channel closed");
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {what}");
}

async fn wait_until_idle(handle: &EngineHandle) {
    let mut status = handle.watch_status();
    wait_for(&mut status, "engine idle", |s| s.state == StateLabel::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn incoming_call_is_answered_greeted_and_stopped_by_phrase() {
    let rig = Rig::new(PlaceholderCapture::script([ListenOutcome::Transcript(
        "stop".into(),
    )]));
    // Native accept declines; the answer action takes the call.
    let rig = Rig {
        answer: Arc::new(PlaceholderAnswer::script(
            MechanismScript::Declines,
            MechanismScript::Answers,
            MechanismScript::Answers,
        )),
        ..rig
    };
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.line_event(LineEvent::Ringing {
        number: "+8801712345678".into(),
    });
    wait_until_idle(&handle).await;

    assert_eq!(rig.answer.call_counts(), (1, 1, 0));
    // Exactly one listen attempt, in the regional primary locale.
    assert_eq!(rig.capture.requested_locales(), vec![Locale::BengaliBd]);
    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0], prompts::greeting_incoming_call());
    assert_eq!(spoken[1], prompts::farewell(Lang::Bengali));
    assert_eq!(rig.route.engage_count(), 1);
    assert_eq!(rig.route.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_answer_cascade_still_runs_the_conversation() {
    let rig = Rig::new(PlaceholderCapture::script([ListenOutcome::Transcript(
        "stop".into(),
    )]));
    // Every mechanism fails; the caller may have picked up manually.
    let rig = Rig {
        answer: Arc::new(PlaceholderAnswer::script(
            MechanismScript::Fails,
            MechanismScript::Declines,
            MechanismScript::Fails,
        )),
        ..rig
    };
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.line_event(LineEvent::Ringing {
        number: "+8801712345678".into(),
    });
    wait_until_idle(&handle).await;

    assert_eq!(rig.answer.call_counts(), (1, 1, 1));
    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken.first().unwrap(), prompts::greeting_incoming_call());
}

#[tokio::test(start_paused = true)]
async fn no_match_walks_the_locale_fallback_chain() {
    let rig = Rig::new(PlaceholderCapture::script([
        ListenOutcome::NoMatch,
        ListenOutcome::Timeout,
        ListenOutcome::Transcript("hello there".into()),
        ListenOutcome::Transcript("stop".into()),
    ]));
    let backend = ScriptedBackend::new([Ok("Hi! How can I help?".to_string())]);
    let (handle, _task) =
        ConversationEngine::spawn(fast_config(), rig.capabilities(backend.clone()));

    handle.start();
    wait_until_idle(&handle).await;

    // bn-BD, then generic bn, then en-US; the English transcript makes the
    // next turn start from en-US again.
    assert_eq!(
        rig.capture.requested_locales(),
        vec![
            Locale::BengaliBd,
            Locale::Bengali,
            Locale::EnglishUs,
            Locale::EnglishUs,
        ]
    );
    assert_eq!(backend.call_count(), 1);
    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken[0], prompts::greeting_tap_to_start());
    assert!(spoken.contains(&"Hi! How can I help?".to_string()));
    // The stop phrase arrived on an English turn.
    assert_eq!(spoken.last().unwrap(), prompts::farewell(Lang::English));
}

#[tokio::test(start_paused = true)]
async fn busy_recognizer_restarts_the_chain() {
    let rig = Rig::new(PlaceholderCapture::script([
        ListenOutcome::NoMatch,
        ListenOutcome::Busy,
        ListenOutcome::Transcript("stop".into()),
    ]));
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.start();
    wait_until_idle(&handle).await;

    // Busy resets the chain: back to the regional primary, not the next step.
    assert_eq!(
        rig.capture.requested_locales(),
        vec![Locale::BengaliBd, Locale::Bengali, Locale::BengaliBd]
    );
}

#[tokio::test(start_paused = true)]
async fn transient_backend_failures_retry_then_recover() {
    let rig = Rig::new(PlaceholderCapture::script([
        ListenOutcome::Transcript("what time is it".into()),
        ListenOutcome::Transcript("stop".into()),
    ]));
    let backend = ScriptedBackend::new([
        Err(BackendError::RateLimited),
        Err(BackendError::Http(500)),
        Ok("It is noon.".to_string()),
    ]);
    let (handle, _task) =
        ConversationEngine::spawn(fast_config(), rig.capabilities(backend.clone()));

    // Record every (state, retry_count) the status surface publishes.
    let mut status = handle.watch_status();
    let seen: Arc<Mutex<Vec<(StateLabel, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    tokio::spawn(async move {
        loop {
            {
                let snapshot = status.borrow_and_update();
                sink.lock().unwrap().push((snapshot.state, snapshot.retry_count));
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    });

    handle.start();
    wait_until_idle(&handle).await;

    assert_eq!(backend.call_count(), 3);
    let spoken = rig.synthesis.transcript();
    assert!(spoken.contains(&"It is noon.".to_string()));
    // The turn after recovery listened again.
    assert_eq!(rig.capture.request_count(), 2);

    // Both failed attempts were visible while thinking, and the recovered
    // reply spoke with the counter back at zero.
    let seen = seen.lock().unwrap();
    assert!(seen.contains(&(StateLabel::Thinking, 2)));
    let last_thinking = seen
        .iter()
        .rposition(|(state, _)| *state == StateLabel::Thinking)
        .unwrap();
    assert!(seen[last_thinking..]
        .iter()
        .any(|(state, retries)| *state == StateLabel::Speaking && *retries == 0));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_apologize_and_keep_listening() {
    let rig = Rig::new(PlaceholderCapture::script([
        ListenOutcome::Transcript("what time is it".into()),
        ListenOutcome::Transcript("stop".into()),
    ]));
    // Four transient failures: initial attempt plus the full retry budget.
    let backend = ScriptedBackend::new([
        Err(BackendError::RateLimited),
        Err(BackendError::RateLimited),
        Err(BackendError::RateLimited),
        Err(BackendError::Network("reset".into())),
    ]);
    let (handle, _task) =
        ConversationEngine::spawn(fast_config(), rig.capabilities(backend.clone()));

    handle.start();
    wait_until_idle(&handle).await;

    assert_eq!(backend.call_count(), 4);
    let spoken = rig.synthesis.transcript();
    assert!(spoken.contains(&prompts::apology(Lang::English).to_string()));
    // The apology is followed by another listen, which heard the stop phrase.
    assert_eq!(rig.capture.request_count(), 2);
    assert_eq!(spoken.last().unwrap(), prompts::farewell(Lang::English));
}

#[tokio::test(start_paused = true)]
async fn fatal_backend_error_ends_the_session() {
    let rig = Rig::new(PlaceholderCapture::script([ListenOutcome::Transcript(
        "hello".into(),
    )]));
    let backend = ScriptedBackend::new([Err(BackendError::Unauthorized(401))]);
    let (handle, _task) =
        ConversationEngine::spawn(fast_config(), rig.capabilities(backend.clone()));

    handle.start();
    let mut status = handle.watch_status();
    wait_for(&mut status, "error status", |s| s.state == StateLabel::Error).await;

    // No retries on credential failures.
    assert_eq!(backend.call_count(), 1);
    let spoken = rig.synthesis.transcript();
    assert_eq!(
        spoken.last().unwrap(),
        prompts::configuration_error(Lang::English)
    );
    assert_eq!(rig.route.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_loss_mid_capture_says_goodbye() {
    let rig = Rig::new(PlaceholderCapture::script([ListenOutcome::NetworkLoss]));
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.start();
    let mut status = handle.watch_status();
    wait_for(&mut status, "error status", |s| s.state == StateLabel::Error).await;

    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken.last().unwrap(), prompts::network_lost(Lang::Bengali));
}

#[tokio::test(start_paused = true)]
async fn start_while_offline_reports_an_error_status() {
    let rig = Rig::new(PlaceholderCapture::new());
    let rig = Rig {
        connectivity: Arc::new(PlaceholderConnectivity::offline()),
        ..rig
    };
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.start();
    let mut status = handle.watch_status();
    wait_for(&mut status, "error status", |s| s.state == StateLabel::Error).await;

    // No session ever started: nothing spoken, nothing routed.
    assert!(rig.synthesis.transcript().is_empty());
    assert_eq!(rig.route.engage_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn duration_guard_expiry_farewells_and_stops() {
    // Capture never hears anything; the guard has to end the session.
    let rig = Rig::new(PlaceholderCapture::new());
    let backend = ScriptedBackend::new([]);
    let mut config = fast_config();
    config.guard = GuardConfig {
        warn_after: Duration::from_secs(1),
        max_duration: Duration::from_secs(2),
        tick: Duration::from_millis(200),
    };
    let (handle, _task) = ConversationEngine::spawn(config, rig.capabilities(backend));

    handle.start();
    wait_until_idle(&handle).await;

    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken.last().unwrap(), prompts::farewell(Lang::Bengali));
    assert_eq!(rig.route.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_during_an_utterance_never_restarts_capture() {
    // The greeting is still playing when the limit hits; its completion must
    // not start capture underneath the farewell, even with no settle delay.
    let rig = Rig::new(PlaceholderCapture::new());
    let rig = Rig {
        synthesis: Arc::new(
            PlaceholderSynthesis::new().with_latency(Duration::from_millis(300)),
        ),
        ..rig
    };
    let backend = ScriptedBackend::new([]);
    let mut config = fast_config();
    config.speech.settle_delay_ms = 0;
    config.guard = GuardConfig {
        warn_after: Duration::from_millis(100),
        max_duration: Duration::from_millis(200),
        tick: Duration::from_millis(50),
    };
    let (handle, _task) = ConversationEngine::spawn(config, rig.capabilities(backend));

    handle.start();
    wait_until_idle(&handle).await;

    assert_eq!(rig.capture.request_count(), 0);
    let spoken = rig.synthesis.transcript();
    assert_eq!(spoken.last().unwrap(), prompts::farewell(Lang::Bengali));
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_start_is_exclusive() {
    let rig = Rig::new(PlaceholderCapture::new());
    let backend = ScriptedBackend::new([]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.start();
    // Second start while a session is live is ignored.
    handle.start();
    let mut status = handle.watch_status();
    wait_for(&mut status, "session listening", |s| {
        s.state == StateLabel::Listening
    })
    .await;

    handle.stop();
    handle.stop();
    wait_until_idle(&handle).await;

    let greetings = rig
        .synthesis
        .transcript()
        .iter()
        .filter(|t| t.as_str() == prompts::greeting_tap_to_start())
        .count();
    assert_eq!(greetings, 1);
    assert_eq!(rig.route.engage_count(), 1);
    assert_eq!(rig.route.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn capture_and_synthesis_never_overlap() {
    let probe = AudioBusyProbe::new();
    let capture = PlaceholderCapture::script([
        ListenOutcome::Transcript("hello there".into()),
        ListenOutcome::Transcript("stop".into()),
    ])
    .with_latency(Duration::from_millis(50))
    .with_probe(probe.clone());
    let rig = Rig::new(capture);
    let rig = Rig {
        synthesis: Arc::new(
            PlaceholderSynthesis::new()
                .with_latency(Duration::from_millis(50))
                .with_probe(probe.clone()),
        ),
        ..rig
    };
    let backend = ScriptedBackend::new([Ok("Hi!".to_string())]);
    let (handle, _task) = ConversationEngine::spawn(fast_config(), rig.capabilities(backend));

    handle.start();
    wait_until_idle(&handle).await;

    assert_eq!(probe.peak(), 1);
}
