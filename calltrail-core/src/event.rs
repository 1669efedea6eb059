//! Provider Payload Decoding
//!
//! The telephony provider posts loosely-typed JSON: numbers arrive as
//! numbers or numeric strings, parties arrive as plain strings or as
//! objects, and the lifecycle phase may be missing entirely on older
//! webhook flavors. This module decodes that shape once, at the boundary,
//! into explicit types:
//!
//! - [`LifecycleEvent`]: tagged union over the lifecycle phases plus the
//!   legacy single-shot event and the recording-link-only event
//! - [`RecordingJob`]: the "recording ready" signal
//! - [`ProviderFields`]: the normalized raw fields the outcome deriver reads

use crate::{CallDirection, CallPhase, DecodeError, Timestamp};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Epoch values at or above this are milliseconds, below are seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// `command_id` the provider uses for calls an operator placed.
const OUTBOUND_COMMAND_ID: &str = "USER_CALL";

// ============================================================================
// RAW PAYLOAD
// ============================================================================

/// Lifecycle webhook body exactly as the provider sends it.
///
/// Every field is an untyped [`Value`]; a field of the wrong type is moved
/// into `extra` on decode instead of rejecting the body. Unknown fields are
/// kept in `extra` too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    #[serde(default)]
    pub call_id: Option<Value>,
    #[serde(default)]
    pub call_state: Option<Value>,
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub direction: Option<Value>,
    #[serde(default)]
    pub command_id: Option<Value>,
    #[serde(default)]
    pub entry_id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub disconnect_reason: Option<Value>,
    #[serde(default)]
    pub entry_result: Option<Value>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub create_time: Option<Value>,
    #[serde(default)]
    pub answer_time: Option<Value>,
    #[serde(default)]
    pub end_time: Option<Value>,
    #[serde(default)]
    pub city: Option<Value>,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// NORMALIZED FIELDS
// ============================================================================

/// Union of the provider fields any lifecycle or legacy event may carry.
///
/// Zero codes and non-positive epochs are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFields {
    /// Named disconnect reason code (1100, 1101, ...)
    pub disconnect_reason: Option<i64>,
    /// SIP-style numeric result code (200, 486, ...)
    pub result_code: Option<i64>,
    /// Entry-level result indicator ("success", ...)
    pub entry_result: Option<String>,
    /// Explicit duration in seconds
    pub duration: Option<i64>,
    pub create_time: Option<Timestamp>,
    pub answer_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
}

/// Everything a lifecycle event says about one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallDetails {
    pub external_call_id: String,
    /// Caller address (number or SIP URI)
    pub caller: Option<String>,
    /// Callee line (number or SIP URI)
    pub callee: Option<String>,
    pub direction: Option<CallDirection>,
    pub fields: ProviderFields,
    pub city: Option<String>,
    pub source: Option<String>,
    /// Provider fields this decoder does not understand
    pub extra: Map<String, Value>,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Attach a direct recording URL to an existing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingLink {
    pub external_call_id: String,
    pub recording_link: String,
}

/// One inbound call event, decoded at the webhook boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "call")]
pub enum LifecycleEvent {
    Appeared(CallDetails),
    Connected(CallDetails),
    Disconnected(CallDetails),
    /// Single-shot event without a phase (older webhook flavor)
    Legacy(CallDetails),
    RecordingLinkOnly(RecordingLink),
}

impl LifecycleEvent {
    /// Decode a lifecycle webhook body.
    pub fn from_payload(payload: ProviderPayload) -> Result<Self, DecodeError> {
        let external_call_id = payload
            .call_id
            .as_ref()
            .and_then(value_to_string)
            .ok_or(DecodeError::MissingField { field: "call_id" })?;

        let mut extra = payload.extra;

        let call_state = text_field(payload.call_state, "call_state", &mut extra);
        let phase = call_state.as_deref().and_then(|s| s.parse::<CallPhase>().ok());
        if let Some(state) = call_state.filter(|_| phase.is_none()) {
            extra.insert("call_state".to_string(), Value::String(state));
        }

        let explicit_direction = text_field(payload.direction, "direction", &mut extra);
        let parsed_direction = explicit_direction
            .as_deref()
            .and_then(|d| d.parse::<CallDirection>().ok());
        if let Some(raw) = explicit_direction.filter(|_| parsed_direction.is_none()) {
            extra.insert("direction".to_string(), Value::String(raw));
        }
        let command_id = text_field(payload.command_id, "command_id", &mut extra);
        let direction = parsed_direction.or_else(|| {
            command_id.as_deref().map(|cmd| {
                if cmd == OUTBOUND_COMMAND_ID {
                    CallDirection::Outbound
                } else {
                    CallDirection::Inbound
                }
            })
        });

        let city = text_field(payload.city, "city", &mut extra);
        let source = text_field(payload.source, "source", &mut extra);

        let create_time = payload
            .create_time
            .as_ref()
            .and_then(value_to_epoch)
            .or_else(|| payload.timestamp.as_ref().and_then(value_to_epoch));

        let fields = ProviderFields {
            disconnect_reason: payload
                .disconnect_reason
                .as_ref()
                .and_then(value_to_i64)
                .filter(|code| *code != 0),
            result_code: payload
                .result
                .as_ref()
                .and_then(value_to_i64)
                .filter(|code| *code != 0),
            entry_result: payload.entry_result.as_ref().and_then(value_to_string),
            duration: payload.duration.as_ref().and_then(value_to_i64),
            create_time,
            answer_time: payload.answer_time.as_ref().and_then(value_to_epoch),
            end_time: payload.end_time.as_ref().and_then(value_to_epoch),
        };

        if let Some(entry_id) = payload.entry_id {
            extra.insert("entry_id".to_string(), entry_id);
        }

        let details = CallDetails {
            external_call_id,
            caller: payload.from.as_ref().and_then(party_address),
            callee: payload.to.as_ref().and_then(party_address),
            direction,
            fields,
            city,
            source,
            extra,
        };

        Ok(match phase {
            Some(CallPhase::Appeared) => LifecycleEvent::Appeared(details),
            Some(CallPhase::Connected) => LifecycleEvent::Connected(details),
            Some(CallPhase::Disconnected) => LifecycleEvent::Disconnected(details),
            None => LifecycleEvent::Legacy(details),
        })
    }

    /// Decode a raw JSON body.
    pub fn from_json(value: Value) -> Result<Self, DecodeError> {
        let payload: ProviderPayload =
            serde_json::from_value(value).map_err(|e| DecodeError::InvalidValue {
                field: "body",
                reason: e.to_string(),
            })?;
        Self::from_payload(payload)
    }

    pub fn external_call_id(&self) -> &str {
        match self {
            LifecycleEvent::Appeared(d)
            | LifecycleEvent::Connected(d)
            | LifecycleEvent::Disconnected(d)
            | LifecycleEvent::Legacy(d) => &d.external_call_id,
            LifecycleEvent::RecordingLinkOnly(link) => &link.external_call_id,
        }
    }

    pub fn phase(&self) -> Option<CallPhase> {
        match self {
            LifecycleEvent::Appeared(_) => Some(CallPhase::Appeared),
            LifecycleEvent::Connected(_) => Some(CallPhase::Connected),
            LifecycleEvent::Disconnected(_) => Some(CallPhase::Disconnected),
            LifecycleEvent::Legacy(_) | LifecycleEvent::RecordingLinkOnly(_) => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleEvent::Appeared(_) => "appeared",
            LifecycleEvent::Connected(_) => "connected",
            LifecycleEvent::Disconnected(_) => "disconnected",
            LifecycleEvent::Legacy(_) => "legacy",
            LifecycleEvent::RecordingLinkOnly(_) => "recording_link",
        }
    }
}

impl RecordingLink {
    /// Decode the legacy recording-link webhook body.
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let external_call_id = value
            .get("call_id")
            .and_then(value_to_string)
            .ok_or(DecodeError::MissingField { field: "call_id" })?;
        let recording_link = value
            .get("recording_link")
            .and_then(value_to_string)
            .ok_or(DecodeError::MissingField {
                field: "recording_link",
            })?;
        Ok(Self {
            external_call_id,
            recording_link,
        })
    }
}

// ============================================================================
// RECORDING JOB
// ============================================================================

/// "Recording ready" signal for the retrieval pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingJob {
    /// Correlates to a call's external id (possibly in a different format)
    #[serde(default, deserialize_with = "lenient_string")]
    pub entry_id: String,
    /// Opaque handle used to fetch the audio
    #[serde(default, deserialize_with = "lenient_string")]
    pub recording_id: String,
    #[serde(
        default,
        alias = "recording_state",
        alias = "state",
        deserialize_with = "lenient_string"
    )]
    pub job_state: String,
}

impl RecordingJob {
    pub fn is_completed(&self) -> bool {
        self.job_state.trim().eq_ignore_ascii_case("completed")
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string).unwrap_or_default())
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text of a string or number field. Anything else that is not null goes
/// to `extra` under `key`.
fn text_field(value: Option<Value>, key: &str, extra: &mut Map<String, Value>) -> Option<String> {
    let value = value?;
    let text = value_to_string(&value);
    if text.is_none() && !value.is_null() {
        extra.insert(key.to_string(), value);
    }
    text
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn value_to_epoch(value: &Value) -> Option<Timestamp> {
    value_to_i64(value).and_then(epoch_to_timestamp)
}

/// Convert an epoch value in seconds or milliseconds to a UTC instant.
pub fn epoch_to_timestamp(raw: i64) -> Option<Timestamp> {
    if raw <= 0 {
        return None;
    }
    let millis = if raw >= EPOCH_MILLIS_THRESHOLD {
        raw
    } else {
        raw.checked_mul(1000)?
    };
    Utc.timestamp_millis_opt(millis).single()
}

/// Party fields are either plain strings or `{number, extension}` objects.
fn party_address(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["number", "extension", "sip"]
            .iter()
            .find_map(|key| map.get(*key).and_then(value_to_string)),
        other => value_to_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_connected_phase() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "MToxMDE=",
            "call_state": "Connected",
            "from": "79990001122",
            "to": "sip:alice@pbx.example",
        }))?;
        assert_eq!(event.phase(), Some(CallPhase::Connected));
        assert_eq!(event.external_call_id(), "MToxMDE=");
        match event {
            LifecycleEvent::Connected(details) => {
                assert_eq!(details.callee.as_deref(), Some("sip:alice@pbx.example"));
                assert_eq!(details.caller.as_deref(), Some("79990001122"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_phase_is_legacy() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": 777,
            "result": 200,
        }))?;
        assert_eq!(event.label(), "legacy");
        assert_eq!(event.external_call_id(), "777");
        Ok(())
    }

    #[test]
    fn test_unknown_phase_is_legacy_and_preserved() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "c-1",
            "call_state": "OnHold",
            "vendor_flag": true,
        }))?;
        match event {
            LifecycleEvent::Legacy(details) => {
                assert_eq!(details.extra.get("call_state"), Some(&json!("OnHold")));
                assert_eq!(details.extra.get("vendor_flag"), Some(&json!(true)));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_call_id_is_rejected() {
        let err = LifecycleEvent::from_json(json!({ "call_state": "Connected" }));
        assert_eq!(err, Err(DecodeError::MissingField { field: "call_id" }));
    }

    #[test]
    fn test_party_objects_and_numeric_strings() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "c-2",
            "call_state": "Disconnected",
            "from": { "number": "74950000000" },
            "to": { "extension": "101", "number": "" },
            "disconnect_reason": "1101",
            "duration": "17",
        }))?;
        match event {
            LifecycleEvent::Disconnected(details) => {
                assert_eq!(details.caller.as_deref(), Some("74950000000"));
                assert_eq!(details.callee.as_deref(), Some("101"));
                assert_eq!(details.fields.disconnect_reason, Some(1101));
                assert_eq!(details.fields.duration, Some(17));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_direction_from_command_id() -> Result<(), DecodeError> {
        let outbound = LifecycleEvent::from_json(json!({
            "call_id": "c-3",
            "command_id": "USER_CALL",
        }))?;
        let inbound = LifecycleEvent::from_json(json!({
            "call_id": "c-4",
            "command_id": "ROUTE",
        }))?;
        let explicit = LifecycleEvent::from_json(json!({
            "call_id": "c-5",
            "command_id": "USER_CALL",
            "direction": "inbound",
        }))?;
        let direction = |e: &LifecycleEvent| match e {
            LifecycleEvent::Legacy(d) => d.direction,
            _ => None,
        };
        assert_eq!(direction(&outbound), Some(CallDirection::Outbound));
        assert_eq!(direction(&inbound), Some(CallDirection::Inbound));
        assert_eq!(direction(&explicit), Some(CallDirection::Inbound));
        Ok(())
    }

    #[test]
    fn test_mistyped_text_fields_do_not_reject_event() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "x-1",
            "call_state": "Disconnected",
            "disconnect_reason": 1101,
            "city": 5,
            "direction": 1,
            "source": { "campaign": "spring" },
            "command_id": ["USER_CALL"],
        }))?;
        match event {
            LifecycleEvent::Disconnected(details) => {
                assert_eq!(details.fields.disconnect_reason, Some(1101));
                assert_eq!(details.city.as_deref(), Some("5"));
                assert_eq!(details.direction, None);
                assert_eq!(details.source, None);
                assert_eq!(details.extra.get("direction"), Some(&json!("1")));
                assert_eq!(details.extra.get("source"), Some(&json!({ "campaign": "spring" })));
                assert_eq!(details.extra.get("command_id"), Some(&json!(["USER_CALL"])));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_numeric_call_state_is_legacy() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({ "call_id": "x-2", "call_state": 3 }))?;
        match event {
            LifecycleEvent::Legacy(details) => {
                assert_eq!(details.extra.get("call_state"), Some(&json!("3")));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_zero_codes_are_absent() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "c-6",
            "result": 0,
            "disconnect_reason": 0,
        }))?;
        match event {
            LifecycleEvent::Legacy(details) => {
                assert_eq!(details.fields.result_code, None);
                assert_eq!(details.fields.disconnect_reason, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_epoch_seconds_and_millis_agree() {
        let from_secs = epoch_to_timestamp(1_700_000_000);
        let from_millis = epoch_to_timestamp(1_700_000_000_000);
        assert!(from_secs.is_some());
        assert_eq!(from_secs, from_millis);
        assert_eq!(epoch_to_timestamp(0), None);
        assert_eq!(epoch_to_timestamp(-5), None);
    }

    #[test]
    fn test_create_time_falls_back_to_timestamp() -> Result<(), DecodeError> {
        let event = LifecycleEvent::from_json(json!({
            "call_id": "c-7",
            "timestamp": 1_700_000_000,
        }))?;
        match event {
            LifecycleEvent::Legacy(details) => {
                assert_eq!(details.fields.create_time, epoch_to_timestamp(1_700_000_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_recording_link_requires_both_fields() {
        let ok = RecordingLink::from_json(&json!({
            "call_id": "c-8",
            "recording_link": "https://records.example/c-8.mp3",
        }));
        assert!(ok.is_ok());

        let missing = RecordingLink::from_json(&json!({ "call_id": "c-8" }));
        assert_eq!(
            missing,
            Err(DecodeError::MissingField {
                field: "recording_link"
            })
        );
    }

    #[test]
    fn test_recording_job_decoding() -> Result<(), serde_json::Error> {
        let job: RecordingJob = serde_json::from_value(json!({
            "entry_id": 42,
            "recording_id": "rec-9",
            "recording_state": "Completed",
        }))?;
        assert_eq!(job.entry_id, "42");
        assert!(job.is_completed());

        let pending: RecordingJob = serde_json::from_value(json!({
            "entry_id": "e-1",
            "job_state": "started",
        }))?;
        assert!(!pending.is_completed());
        assert!(pending.recording_id.is_empty());
        Ok(())
    }
}
