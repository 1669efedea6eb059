//! API Request and Response Types

use crate::constants::{MSG_MISSING_FIELDS, MSG_RECORDING_LINK_SAVED, MSG_WEBHOOK_PROCESSED};
use crate::pipeline::PipelineReport;
use crate::reconciler::{ReconcileAction, ReconcileError, Reconciliation};
use calltrail_core::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::json;

// ============================================================================
// WEBHOOK ACKNOWLEDGEMENT
// ============================================================================

/// Body of every provider-facing webhook response.
///
/// Always sent with HTTP 200; failures only show up as `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub data: Option<serde_json::Value>,
}

impl WebhookAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Acknowledge a lifecycle event.
    pub fn from_reconciliation(result: &Result<Reconciliation, ReconcileError>) -> Self {
        match result {
            Ok(done) => match (&done.action, &done.record) {
                (ReconcileAction::Skipped(reason), _) => Self::ok(reason.message()),
                (_, Some(record)) => Self::ok(MSG_WEBHOOK_PROCESSED).with_data(json!({
                    "callId": record.id,
                    "status": record.status,
                })),
                (_, None) => Self::ok(MSG_WEBHOOK_PROCESSED),
            },
            Err(ReconcileError::CallNotFound { .. }) => Self::failed("Call not found"),
            Err(e) => Self::failed(format!("Processing failed: {}", e)),
        }
    }

    /// Acknowledge a recording-link event.
    pub fn from_recording_link(result: &Result<Reconciliation, ReconcileError>) -> Self {
        match result {
            Ok(done) => {
                let ack = Self::ok(MSG_RECORDING_LINK_SAVED);
                match &done.record {
                    Some(record) => ack.with_data(json!({ "callId": record.id })),
                    None => ack,
                }
            }
            Err(_) => Self::from_reconciliation(result),
        }
    }

    /// Reject a body that could not be decoded.
    pub fn from_decode_error(error: &DecodeError) -> Self {
        match error {
            DecodeError::MissingField { .. } => Self::failed(MSG_MISSING_FIELDS),
            DecodeError::InvalidValue { .. } => Self::failed(error.to_string()),
        }
    }
}

impl From<PipelineReport> for WebhookAck {
    fn from(report: PipelineReport) -> Self {
        let ack = WebhookAck {
            success: report.success,
            message: report.message,
            data: None,
        };
        match (report.call_id, report.recording_ref) {
            (Some(call_id), recording_ref) => ack.with_data(json!({
                "callId": call_id,
                "recordingRef": recording_ref,
            })),
            (None, _) => ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::SkipReason;
    use calltrail_core::{CallRecord, CallStatus, StorageError};

    fn record() -> CallRecord {
        CallRecord {
            id: 5,
            external_call_id: "ext-5".to_string(),
            phone_client: None,
            phone_line: None,
            direction: None,
            created_at: None,
            answered_at: None,
            ended_at: None,
            status: CallStatus::Busy,
            duration_seconds: 0,
            operator_id: None,
            recording_ref: None,
            city: None,
            source: None,
        }
    }

    #[test]
    fn test_processed_ack_carries_call() {
        let ack = WebhookAck::from_reconciliation(&Ok(Reconciliation {
            action: ReconcileAction::Created,
            record: Some(record()),
            broadcasts: vec![],
        }));
        assert!(ack.success);
        assert_eq!(ack.message, MSG_WEBHOOK_PROCESSED);
        assert_eq!(ack.data, Some(json!({"callId": 5, "status": "busy"})));
    }

    #[test]
    fn test_skip_is_success() {
        let ack = WebhookAck::from_reconciliation(&Ok(Reconciliation {
            action: ReconcileAction::Skipped(SkipReason::IvrRouted),
            record: None,
            broadcasts: vec![],
        }));
        assert!(ack.success);
        assert_eq!(ack.message, "IVR call skipped");
    }

    #[test]
    fn test_store_failure_is_soft_ack() {
        let ack = WebhookAck::from_reconciliation(&Err(ReconcileError::Store(
            StorageError::Unavailable {
                reason: "down".to_string(),
            },
        )));
        assert!(!ack.success);
        assert!(ack.message.contains("down"));
    }

    #[test]
    fn test_missing_field_message() {
        let ack = WebhookAck::from_decode_error(&DecodeError::MissingField { field: "call_id" });
        assert_eq!(ack.message, MSG_MISSING_FIELDS);
        let json = serde_json::to_value(&ack).unwrap();
        assert!(json.get("data").is_none());
    }
}
