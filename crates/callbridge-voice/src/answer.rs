//! Call answering: a fixed cascade of accept mechanisms, most reliable first.
//!
//! Telephony stacks are inconsistent about which accept path actually works,
//! so the strategy walks all three and treats per-mechanism errors the same
//! as a decline. Only when every mechanism has been exhausted does the
//! attempt fail as a whole.

use crate::capabilities::CallAnswerCapability;
use callbridge_core::{AgentError, AgentResult};
use tracing::{debug, info, warn};

/// The accept mechanism that took the call off-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMechanism {
    /// Native telecom accept (requires a ringing line).
    NativeAccept,
    /// Broadcast-style answer action.
    AnswerAction,
    /// Headset-hook key injection.
    KeyInjection,
}

/// A successful answer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub mechanism: AnswerMechanism,
}

/// Walks the accept cascade against a [`CallAnswerCapability`].
pub struct CallAnswerStrategy;

impl CallAnswerStrategy {
    /// Try each mechanism in order until one reports the call answered.
    ///
    /// The native accept is skipped entirely when the line is no longer
    /// ringing (it would throw rather than no-op on settled calls).
    pub async fn answer(capability: &dyn CallAnswerCapability) -> AgentResult<AnswerOutcome> {
        if capability.line_is_ringing().await {
            match capability.try_native_accept().await {
                Ok(true) => {
                    info!("call answered via native accept");
                    return Ok(AnswerOutcome {
                        mechanism: AnswerMechanism::NativeAccept,
                    });
                }
                Ok(false) => debug!("native accept declined, falling through"),
                Err(e) => warn!("native accept failed: {e}"),
            }
        } else {
            debug!("line not ringing, skipping native accept");
        }

        match capability.try_answer_action().await {
            Ok(true) => {
                info!("call answered via answer action");
                return Ok(AnswerOutcome {
                    mechanism: AnswerMechanism::AnswerAction,
                });
            }
            Ok(false) => debug!("answer action declined, falling through"),
            Err(e) => warn!("answer action failed: {e}"),
        }

        match capability.try_key_injection().await {
            Ok(true) => {
                info!("call answered via key injection");
                return Ok(AnswerOutcome {
                    mechanism: AnswerMechanism::KeyInjection,
                });
            }
            Ok(false) => debug!("key injection declined"),
            Err(e) => warn!("key injection failed: {e}"),
        }

        warn!("all answer mechanisms exhausted");
        Err(AgentError::CallAnswerFailed)
    }
}
