//! Call-duration guard: a warning near the limit, a hard stop at it.
//!
//! Runs as a detached tick task so the engine's event loop never has to poll
//! the clock itself. Each of the two events fires at most once per guard.

use callbridge_core::GuardSettings;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Timing for one guarded session.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Elapsed time after which the warning fires.
    pub warn_after: Duration,
    /// Elapsed time after which the session is force-ended.
    pub max_duration: Duration,
    /// Clock check cadence.
    pub tick: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(8 * 60),
            max_duration: Duration::from_secs(10 * 60),
            tick: Duration::from_secs(60),
        }
    }
}

impl From<&GuardSettings> for GuardConfig {
    fn from(settings: &GuardSettings) -> Self {
        Self {
            warn_after: Duration::from_secs(settings.warning_minutes * 60),
            max_duration: Duration::from_secs(settings.max_call_minutes * 60),
            tick: Duration::from_secs(settings.tick_secs.max(1)),
        }
    }
}

/// Events emitted by the guard, in order. `Expired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    Warning { remaining: Duration },
    Expired,
}

/// A running duration guard. Dropping or calling [`stop`](Self::stop) aborts
/// the tick task.
pub struct DurationGuard {
    task: Option<JoinHandle<()>>,
}

impl DurationGuard {
    /// Start guarding from now. Events arrive on the returned receiver.
    pub fn start(config: GuardConfig) -> (Self, mpsc::UnboundedReceiver<GuardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let started = Instant::now();

        let task = tokio::spawn(async move {
            let mut ticker = interval(config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut warned = false;
            loop {
                ticker.tick().await;
                let elapsed = started.elapsed();
                if elapsed >= config.max_duration {
                    // One coarse tick can skip past both thresholds; the
                    // warning still goes out first.
                    if !warned {
                        let _ = tx.send(GuardEvent::Warning {
                            remaining: config.max_duration.saturating_sub(elapsed),
                        });
                    }
                    warn!(elapsed_secs = elapsed.as_secs(), "call duration limit reached");
                    let _ = tx.send(GuardEvent::Expired);
                    break;
                }
                if !warned && elapsed >= config.warn_after {
                    warned = true;
                    let remaining = config.max_duration.saturating_sub(elapsed);
                    debug!(
                        remaining_secs = remaining.as_secs(),
                        "call approaching duration limit"
                    );
                    let _ = tx.send(GuardEvent::Warning { remaining });
                }
            }
        });

        (Self { task: Some(task) }, rx)
    }

    /// Stop the guard. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DurationGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
