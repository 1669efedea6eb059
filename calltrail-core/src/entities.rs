//! Call record and operator entities

use crate::{CallDirection, CallStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Internal (store-assigned) call record identifier.
pub type CallId = i64;

/// Operator identifier.
pub type OperatorId = i64;

// ============================================================================
// OPERATOR
// ============================================================================

/// A human operator reachable through a SIP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    /// Routing key, unique across operators
    pub sip_address: String,
    pub city: Option<String>,
}

// ============================================================================
// CALL RECORD
// ============================================================================

/// The durable, authoritative record of one phone call.
///
/// Exactly one record exists per `external_call_id`. After creation every
/// mutation goes through [`CallRecordPatch`], which never clears a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CallRecord {
    pub id: CallId,
    pub external_call_id: String,
    pub phone_client: Option<String>,
    pub phone_line: Option<String>,
    pub direction: Option<CallDirection>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub created_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub answered_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub ended_at: Option<Timestamp>,
    pub status: CallStatus,
    /// Always >= 0
    pub duration_seconds: i32,
    pub operator_id: Option<OperatorId>,
    pub recording_ref: Option<String>,
    pub city: Option<String>,
    pub source: Option<String>,
}

impl CallRecord {
    /// Materialize a record from creation fields and a store-assigned id.
    pub fn from_new(id: CallId, new: NewCallRecord) -> Self {
        Self {
            id,
            external_call_id: new.external_call_id,
            phone_client: new.phone_client,
            phone_line: new.phone_line,
            direction: new.direction,
            created_at: new.created_at,
            answered_at: new.answered_at,
            ended_at: new.ended_at,
            status: new.status,
            duration_seconds: new.duration_seconds.max(0),
            operator_id: new.operator_id,
            recording_ref: None,
            city: new.city,
            source: new.source,
        }
    }

    /// Whether a disconnect has already been folded into this record.
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Fields for creating a call record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCallRecord {
    pub external_call_id: String,
    pub phone_client: Option<String>,
    pub phone_line: Option<String>,
    pub direction: Option<CallDirection>,
    pub created_at: Option<Timestamp>,
    pub answered_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub status: CallStatus,
    pub duration_seconds: i32,
    pub operator_id: Option<OperatorId>,
    pub city: Option<String>,
    pub source: Option<String>,
}

// ============================================================================
// PARTIAL MERGE
// ============================================================================

/// Partial update for a call record.
///
/// `None` means "leave as is"; no field can be cleared through a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecordPatch {
    pub phone_client: Option<String>,
    pub phone_line: Option<String>,
    pub direction: Option<CallDirection>,
    pub created_at: Option<Timestamp>,
    pub answered_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub status: Option<CallStatus>,
    pub duration_seconds: Option<i32>,
    pub operator_id: Option<OperatorId>,
    pub recording_ref: Option<String>,
    pub city: Option<String>,
    pub source: Option<String>,
}

impl CallRecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &CallRecordPatch::default()
    }

    /// Merge this patch into `record`.
    ///
    /// A known positive duration is never replaced by zero.
    pub fn apply_to(&self, record: &mut CallRecord) {
        fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        merge(&mut record.phone_client, &self.phone_client);
        merge(&mut record.phone_line, &self.phone_line);
        merge(&mut record.direction, &self.direction);
        merge(&mut record.created_at, &self.created_at);
        merge(&mut record.answered_at, &self.answered_at);
        merge(&mut record.ended_at, &self.ended_at);
        merge(&mut record.operator_id, &self.operator_id);
        merge(&mut record.recording_ref, &self.recording_ref);
        merge(&mut record.city, &self.city);
        merge(&mut record.source, &self.source);

        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(duration) = self.duration_seconds {
            let duration = duration.max(0);
            if duration > 0 || record.duration_seconds == 0 {
                record.duration_seconds = duration;
            }
        }
    }
}
