//! Call outcome derivation
//!
//! Pure mapping from the provider's raw outcome fields to a normalized
//! [`CallStatus`] and a non-negative duration. Precedence:
//!
//! 1. a nonzero disconnect reason
//! 2. a result code
//! 3. presence of an answer time
//! 4. an entry-level "success" indicator
//! 5. otherwise missed

use crate::{CallStatus, ProviderFields};
use serde::{Deserialize, Serialize};

/// Normalized outcome of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub duration_seconds: i32,
}

/// Derive status and duration from the provider's fields.
pub fn derive_outcome(fields: &ProviderFields) -> CallOutcome {
    CallOutcome {
        status: derive_status(fields),
        duration_seconds: derive_duration(fields),
    }
}

pub fn derive_status(fields: &ProviderFields) -> CallStatus {
    if let Some(reason) = fields.disconnect_reason.filter(|r| *r != 0) {
        return status_from_disconnect_reason(reason);
    }
    if let Some(code) = fields.result_code.filter(|c| *c != 0) {
        return status_from_result_code(code);
    }
    if fields.answer_time.is_some() {
        return CallStatus::Answered;
    }
    let entry_success = fields
        .entry_result
        .as_deref()
        .is_some_and(|r| r.trim().eq_ignore_ascii_case("success"));
    if entry_success {
        return CallStatus::Answered;
    }
    CallStatus::Missed
}

/// Named disconnect reason codes.
pub fn status_from_disconnect_reason(reason: i64) -> CallStatus {
    match reason {
        1100 | 1120 => CallStatus::Answered,
        1101 => CallStatus::Busy,
        1102 => CallStatus::NoAnswer,
        _ => CallStatus::Missed,
    }
}

/// SIP-style result codes.
pub fn status_from_result_code(code: i64) -> CallStatus {
    match code {
        200 => CallStatus::Answered,
        486 => CallStatus::Busy,
        408 | 480 => CallStatus::Missed,
        _ => CallStatus::Failed,
    }
}

/// Explicit nonzero duration, else answer-to-end, else create-to-end, else 0.
pub fn derive_duration(fields: &ProviderFields) -> i32 {
    let seconds = match (fields.duration, fields.end_time) {
        (Some(explicit), _) if explicit != 0 => explicit,
        (_, Some(end)) => match (fields.answer_time, fields.create_time) {
            (Some(answer), _) => (end - answer).num_seconds(),
            (None, Some(created)) => (end - created).num_seconds(),
            (None, None) => 0,
        },
        _ => 0,
    };
    seconds.clamp(0, i64::from(i32::MAX)) as i32
}
