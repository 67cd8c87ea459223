//! Phone-line events fed into the engine by the host's telephony layer.

/// A telephony state change. The host adapter translates its platform's call
/// states into these and forwards them to the engine handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// An incoming call is ringing.
    Ringing { number: String },
    /// The call went off-hook (answered by us or by the user).
    Answered,
    /// The call ended or was declined.
    Ended,
}

/// Mask a phone number for logs: everything but the last four digits.
pub fn masked_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().collect();
    if digits.len() <= 4 {
        return number.to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("…{tail}")
}
