//! CallTrail API - Telephony Webhook Service
//!
//! Receives call lifecycle webhooks from the telephony provider, reconciles
//! them into one call record per external call id, pulls finished recordings
//! into blob storage and fans call events out to WebSocket observers and an
//! optional realtime broadcast service.
//!
//! - [`reconciler`]: lifecycle events to call records
//! - [`pipeline`]: recording retrieval and archival
//! - [`notifier`]: call event fan-out
//! - [`routes`]: the Axum HTTP surface

pub mod config;
pub mod constants;
pub mod db;
pub mod directory;
pub mod error;
pub mod events;
pub mod macros;
pub mod notifier;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod pipeline;
pub mod provider;
pub mod reconciler;
pub mod recordings;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod ws;

// Re-export commonly used types
pub use config::{
    AppConfig, BlobConfig, BroadcastConfig, ProviderConfig, ReconcilerConfig, RecordingConfig,
    ServerConfig,
};
pub use db::{DbConfig, PgCallStore};
pub use directory::OperatorDirectory;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{CallEvent, CallEventKind, CallSnapshot, WsEvent};
pub use notifier::{Broadcaster, Notifier, RealtimeHttpNotifier, WsNotifier};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use pipeline::{PipelineError, PipelineOutcome, PipelineReport, PipelineStage, RecordingPipeline};
pub use provider::{sign_request, MangoRecordingClient, RecordingProvider, SignedRequest};
pub use reconciler::{
    CallLocks, ReconcileAction, ReconcileError, Reconciler, Reconciliation, SkipReason,
};
pub use recordings::{RecordingLinks, RecordingUrl};
pub use routes::create_api_router;
pub use state::{realtime_notifier, AppState, Services};
pub use types::WebhookAck;
pub use ws::WsState;
