//! calltrail Core - Call Record Types
//!
//! Pure data structures and pure functions. All other crates depend on this.
//! Nothing here performs I/O: the store, provider and notifier seams live in
//! `calltrail-storage` and `calltrail-api`.
//!
//! - [`entities`]: call records, operators and the non-destructive patch
//! - [`event`]: provider payload decoding into [`LifecycleEvent`] / [`RecordingJob`]
//! - [`derive`]: status and duration derivation from raw provider fields
//! - [`sip`]: SIP address helpers

use chrono::{DateTime, Utc};

pub mod derive;
pub mod entities;
pub mod enums;
pub mod error;
pub mod event;
pub mod sip;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use derive::{
    derive_duration, derive_outcome, derive_status, status_from_disconnect_reason,
    status_from_result_code, CallOutcome,
};
pub use entities::{CallId, CallRecord, CallRecordPatch, NewCallRecord, Operator, OperatorId};
pub use enums::{CallDirection, CallPhase, CallStatus, CallStatusParseError};
pub use error::{
    BlobError, CallTrailError, CallTrailResult, DecodeError, NotifyError, ProviderError,
    StorageError,
};
pub use event::{
    epoch_to_timestamp, CallDetails, LifecycleEvent, ProviderFields, ProviderPayload,
    RecordingJob, RecordingLink,
};
pub use sip::extract_sip_username;
