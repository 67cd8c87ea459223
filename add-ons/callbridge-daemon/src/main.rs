//! Callbridge Daemon
//!
//! Hosts the conversation engine as a long-running service. Device seams
//! (speech capture, synthesis, telephony) run on placeholders here; a real
//! host wires its platform adapters into the same `Capabilities` struct.

use callbridge_core::{AgentConfig, ChatBackend, GroqBridge, PlaceholderBackend};
use callbridge_voice::{
    Capabilities, ConversationEngine, EngineConfig, MechanismScript, PlaceholderAnswer,
    PlaceholderCapture, PlaceholderConnectivity, PlaceholderRoute, PlaceholderSynthesis,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!(
            "[callbridge-daemon] .env not loaded: {} (using system environment)",
            e
        );
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("failed to load agent configuration: {e}");
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn ChatBackend> = match config.backend.api_key.clone() {
        Some(key) => {
            tracing::info!("chat backend: Groq bridge");
            Arc::new(GroqBridge::with_settings(key, &config.backend))
        }
        None => match GroqBridge::from_env() {
            Some(bridge) => {
                tracing::info!("chat backend: Groq bridge (key from environment)");
                Arc::new(bridge)
            }
            None => {
                tracing::warn!("no API key configured, using the placeholder backend");
                Arc::new(PlaceholderBackend::new())
            }
        },
    };

    let capabilities = Capabilities {
        capture: Arc::new(PlaceholderCapture::new()),
        synthesis: Arc::new(PlaceholderSynthesis::new()),
        answer: Arc::new(PlaceholderAnswer::script(
            MechanismScript::Answers,
            MechanismScript::Answers,
            MechanismScript::Answers,
        )),
        route: Arc::new(PlaceholderRoute::new()),
        connectivity: Arc::new(PlaceholderConnectivity::online()),
        backend,
    };

    let engine_config = EngineConfig::from(&config);
    tracing::info!(
        auto_answer = engine_config.auto_answer,
        max_call_secs = engine_config.guard.max_duration.as_secs(),
        "callbridge daemon started"
    );
    let (handle, engine_task) = ConversationEngine::spawn(engine_config, capabilities);

    // Log every status transition.
    let mut status = handle.watch_status();
    tokio::spawn(async move {
        loop {
            let snapshot = status.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => tracing::info!(status = %json, "engine status"),
                Err(e) => tracing::warn!("status serialization failed: {e}"),
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    });

    if std::env::var("CALLBRIDGE_AUTOSTART")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        tracing::info!("CALLBRIDGE_AUTOSTART set, starting a session");
        handle.start();
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; stopping the engine");
            handle.stop();
        }
        _ = engine_task => {
            tracing::warn!("engine task ended unexpectedly");
        }
    }
}
