//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use calltrail_storage::{BlobStore, CallStore};

use crate::config::AppConfig;
use crate::directory::OperatorDirectory;
use crate::notifier::{Broadcaster, Notifier, RealtimeHttpNotifier, WsNotifier};
use crate::pipeline::RecordingPipeline;
use crate::provider::RecordingProvider;
use crate::reconciler::Reconciler;
use crate::recordings::RecordingLinks;
use crate::ws::WsState;

/// Collaborators the service is wired from.
///
/// `main` passes the PostgreSQL store and the provider's HTTP client; tests
/// pass in-memory stores and scripted fakes.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CallStore>,
    pub provider: Arc<dyn RecordingProvider>,
    /// `None` disables archival
    pub blobs: Option<Arc<dyn BlobStore>>,
    /// Notifiers beyond the in-process WebSocket fan-out
    pub notifiers: Vec<Arc<dyn Notifier>>,
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CallStore>,
    pub reconciler: Arc<Reconciler>,
    pub pipeline: Arc<RecordingPipeline>,
    pub recordings: Arc<RecordingLinks>,
    pub ws: Arc<WsState>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the reconciler, pipeline and broadcast fan-out.
    pub fn new(config: &AppConfig, services: Services) -> Self {
        let ws = Arc::new(WsState::new(config.server.ws_capacity));

        let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(WsNotifier::new(ws.clone()))];
        notifiers.extend(services.notifiers);
        let broadcaster = Broadcaster::new(
            notifiers,
            config.broadcast.rooms.clone(),
            config.broadcast.timeout,
        );

        let store_timeout = config.reconciler.store_timeout;
        let directory = OperatorDirectory::new(
            services.store.clone(),
            config.reconciler.fallback_operator_id,
            store_timeout,
        );
        let reconciler = Reconciler::new(
            services.store.clone(),
            directory,
            broadcaster.clone(),
            store_timeout,
        );
        let pipeline = RecordingPipeline::new(
            services.store.clone(),
            services.provider,
            services.blobs.clone(),
            broadcaster,
            reconciler.locks().clone(),
            config.recording.clone(),
            store_timeout,
        );
        let recordings = RecordingLinks::new(
            services.store.clone(),
            services.blobs,
            config.recording.url_ttl,
            store_timeout,
        );

        Self {
            store: services.store,
            reconciler: Arc::new(reconciler),
            pipeline: Arc::new(pipeline),
            recordings: Arc::new(recordings),
            ws,
            start_time: Instant::now(),
        }
    }
}

/// Realtime HTTP notifier, when a realtime URL is configured.
pub fn realtime_notifier(config: &AppConfig, client: reqwest::Client) -> Option<Arc<dyn Notifier>> {
    let url = config.broadcast.realtime_url.as_ref()?;
    Some(Arc::new(RealtimeHttpNotifier::new(
        client,
        url.clone(),
        config.broadcast.realtime_token.clone(),
    )))
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<Reconciler>, reconciler);
crate::impl_from_ref!(Arc<RecordingPipeline>, pipeline);
crate::impl_from_ref!(Arc<RecordingLinks>, recordings);
crate::impl_from_ref!(Arc<WsState>, ws);
