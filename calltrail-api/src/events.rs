//! Call Event Types
//!
//! Events emitted after call state changes. The same [`CallEvent`] is fanned
//! out to every notifier: the WebSocket stream renders it as a [`WsEvent`],
//! the realtime HTTP notifier posts the snapshot to a broadcast service.

use calltrail_core::{CallDirection, CallId, CallRecord, CallStatus, OperatorId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CALL EVENTS
// ============================================================================

/// Which kind of change a call event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventKind {
    /// A record was created
    CallNew,
    /// A record gained data after creation (e.g. a recording)
    CallUpdated,
    /// A disconnect was folded into the record
    CallEnded,
}

impl CallEventKind {
    /// Path segment used by the realtime broadcast service.
    pub fn broadcast_path(&self) -> &'static str {
        match self {
            CallEventKind::CallNew => "call-new",
            CallEventKind::CallUpdated => "call-updated",
            CallEventKind::CallEnded => "call-ended",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventKind::CallNew => "call_new",
            CallEventKind::CallUpdated => "call_updated",
            CallEventKind::CallEnded => "call_ended",
        }
    }
}

/// Observer-facing view of a call record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub id: CallId,
    pub call_id: String,
    pub phone_client: Option<String>,
    pub phone_line: Option<String>,
    pub direction: Option<CallDirection>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub created_at: Option<Timestamp>,
    pub status: CallStatus,
    pub duration: i32,
    pub operator_id: Option<OperatorId>,
    pub recording_ref: Option<String>,
}

impl From<&CallRecord> for CallSnapshot {
    fn from(record: &CallRecord) -> Self {
        Self {
            id: record.id,
            call_id: record.external_call_id.clone(),
            phone_client: record.phone_client.clone(),
            phone_line: record.phone_line.clone(),
            direction: record.direction,
            created_at: record.created_at,
            status: record.status,
            duration: record.duration_seconds,
            operator_id: record.operator_id,
            recording_ref: record.recording_ref.clone(),
        }
    }
}

/// One call state change, ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    /// UUIDv7, unique per emitted event
    pub event_id: Uuid,
    pub kind: CallEventKind,
    pub call: CallSnapshot,
}

impl CallEvent {
    pub fn new(kind: CallEventKind, record: &CallRecord) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind,
            call: CallSnapshot::from(record),
        }
    }

    pub fn call_new(record: &CallRecord) -> Self {
        Self::new(CallEventKind::CallNew, record)
    }

    pub fn call_updated(record: &CallRecord) -> Self {
        Self::new(CallEventKind::CallUpdated, record)
    }

    pub fn call_ended(record: &CallRecord) -> Self {
        Self::new(CallEventKind::CallEnded, record)
    }

    /// Render as a WebSocket event addressed to `rooms`.
    pub fn to_ws_event(&self, rooms: &[String]) -> WsEvent {
        let event_id = self.event_id;
        let call = self.call.clone();
        let rooms = rooms.to_vec();
        match self.kind {
            CallEventKind::CallNew => WsEvent::CallNew {
                event_id,
                call,
                rooms,
            },
            CallEventKind::CallUpdated => WsEvent::CallUpdated {
                event_id,
                call,
                rooms,
            },
            CallEventKind::CallEnded => WsEvent::CallEnded {
                event_id,
                call,
                rooms,
            },
        }
    }
}

// ============================================================================
// WEBSOCKET EVENTS
// ============================================================================

/// WebSocket event types for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// A new call was recorded.
    CallNew {
        event_id: Uuid,
        call: CallSnapshot,
        rooms: Vec<String>,
    },

    /// An existing call gained data.
    CallUpdated {
        event_id: Uuid,
        call: CallSnapshot,
        rooms: Vec<String>,
    },

    /// A call ended.
    CallEnded {
        event_id: Uuid,
        call: CallSnapshot,
        rooms: Vec<String>,
    },

    // ========================================================================
    // CONNECTION EVENTS
    // ========================================================================
    /// Client successfully connected.
    Connected {
        connection_id: Uuid,
        /// Rooms the client subscribed to; empty means all
        rooms: Vec<String>,
    },

    /// Client disconnected.
    Disconnected { reason: String },

    /// Error occurred.
    Error { message: String },
}

impl WsEvent {
    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::CallNew { .. } => "CallNew",
            WsEvent::CallUpdated { .. } => "CallUpdated",
            WsEvent::CallEnded { .. } => "CallEnded",
            WsEvent::Connected { .. } => "Connected",
            WsEvent::Disconnected { .. } => "Disconnected",
            WsEvent::Error { .. } => "Error",
        }
    }

    /// Rooms a call event is addressed to. `None` for connection events.
    pub fn rooms(&self) -> Option<&[String]> {
        match self {
            WsEvent::CallNew { rooms, .. }
            | WsEvent::CallUpdated { rooms, .. }
            | WsEvent::CallEnded { rooms, .. } => Some(rooms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord {
            id: 5,
            external_call_id: "ext-5".to_string(),
            phone_client: Some("79990001122".to_string()),
            phone_line: Some("101".to_string()),
            direction: Some(CallDirection::Inbound),
            created_at: None,
            answered_at: None,
            ended_at: None,
            status: CallStatus::Answered,
            duration_seconds: 12,
            operator_id: Some(2),
            recording_ref: None,
            city: None,
            source: None,
        }
    }

    #[test]
    fn test_broadcast_paths() {
        assert_eq!(CallEventKind::CallNew.broadcast_path(), "call-new");
        assert_eq!(CallEventKind::CallUpdated.broadcast_path(), "call-updated");
        assert_eq!(CallEventKind::CallEnded.broadcast_path(), "call-ended");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let r = record();
        assert_ne!(CallEvent::call_new(&r).event_id, CallEvent::call_new(&r).event_id);
    }

    #[test]
    fn test_ws_rendering_keeps_kind_and_rooms() {
        let event = CallEvent::call_ended(&record());
        let ws = event.to_ws_event(&["operators".to_string()]);
        assert_eq!(ws.event_type(), "CallEnded");
        assert_eq!(ws.rooms(), Some(&["operators".to_string()][..]));

        let connected = WsEvent::Connected {
            connection_id: Uuid::now_v7(),
            rooms: vec![],
        };
        assert_eq!(connected.rooms(), None);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(CallSnapshot::from(&record()))?;
        assert_eq!(json["callId"], "ext-5");
        assert_eq!(json["phoneClient"], "79990001122");
        assert_eq!(json["operatorId"], 2);
        assert_eq!(json["status"], "answered");
        Ok(())
    }

    #[test]
    fn test_ws_event_tagged_by_type() -> Result<(), serde_json::Error> {
        let ws = CallEvent::call_new(&record()).to_ws_event(&[]);
        let json = serde_json::to_value(&ws)?;
        assert_eq!(json["type"], "CallNew");
        let back: WsEvent = serde_json::from_value(json)?;
        assert_eq!(back, ws);
        Ok(())
    }
}
