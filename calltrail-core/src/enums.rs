//! Enum types for call records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CALL STATUS
// ============================================================================

/// Normalized outcome of a phone call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// An operator picked up the call
    Answered,
    /// The call ended without being picked up
    Missed,
    /// The callee line was busy
    Busy,
    /// The callee did not answer before the provider gave up
    NoAnswer,
    /// The provider reported a failure result code
    Failed,
}

impl CallStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CallStatus::Answered => "answered",
            CallStatus::Missed => "missed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, CallStatusParseError> {
        match normalize_token(s).as_str() {
            "answered" => Ok(CallStatus::Answered),
            "missed" => Ok(CallStatus::Missed),
            "busy" => Ok(CallStatus::Busy),
            "no_answer" | "noanswer" => Ok(CallStatus::NoAnswer),
            "failed" => Ok(CallStatus::Failed),
            _ => Err(CallStatusParseError(s.to_string())),
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, CallStatus::Answered)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for CallStatus {
    type Err = CallStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid call status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatusParseError(pub String);

impl fmt::Display for CallStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid call status: {}", self.0)
    }
}

impl std::error::Error for CallStatusParseError {}

// ============================================================================
// CALL DIRECTION
// ============================================================================

/// Direction of a call relative to the call center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for CallDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "inbound" | "incoming" | "in" => Ok(CallDirection::Inbound),
            "outbound" | "outgoing" | "out" => Ok(CallDirection::Outbound),
            _ => Err(format!("Invalid call direction: {}", s)),
        }
    }
}

// ============================================================================
// LIFECYCLE PHASE
// ============================================================================

/// Named lifecycle phase reported by the telephony provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum CallPhase {
    /// The call showed up on the switch (ringing)
    Appeared,
    /// An endpoint picked up
    Connected,
    /// The call ended
    Disconnected,
}

impl CallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Appeared => "appeared",
            CallPhase::Connected => "connected",
            CallPhase::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "appeared" => Ok(CallPhase::Appeared),
            "connected" => Ok(CallPhase::Connected),
            "disconnected" => Ok(CallPhase::Disconnected),
            _ => Err(format!("Unknown call phase: {}", s)),
        }
    }
}

fn normalize_token(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}
