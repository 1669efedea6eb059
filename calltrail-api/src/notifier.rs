//! Broadcast Notifiers
//!
//! Best-effort fan-out of [`CallEvent`]s to live observers. Delivery never
//! affects the operation that produced the event: every notifier runs in
//! its own spawned task under a timeout, and failures end up in logs and
//! the `calltrail_broadcasts_total` counter only.

use crate::constants::REALTIME_BROADCAST_PATH;
use crate::events::{CallEvent, CallSnapshot};
use crate::telemetry::metrics;
use crate::ws::WsState;
use ::async_trait::async_trait;
use calltrail_core::NotifyError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A destination for call events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Deliver `event` to `rooms`.
    ///
    /// [`NotifyError::Disabled`] means the notifier is switched off by
    /// configuration and is counted as skipped, not failed.
    async fn publish(&self, event: &CallEvent, rooms: &[String]) -> Result<(), NotifyError>;
}

// ============================================================================
// WEBSOCKET
// ============================================================================

/// Publishes into the in-process WebSocket channel.
#[derive(Clone)]
pub struct WsNotifier {
    ws: Arc<WsState>,
}

impl WsNotifier {
    pub fn new(ws: Arc<WsState>) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn publish(&self, event: &CallEvent, rooms: &[String]) -> Result<(), NotifyError> {
        self.ws.broadcast(event.to_ws_event(rooms));
        Ok(())
    }
}

// ============================================================================
// REALTIME HTTP SERVICE
// ============================================================================

#[derive(Serialize)]
struct RealtimeBroadcast<'a> {
    token: &'a str,
    call: &'a CallSnapshot,
    rooms: &'a [String],
}

/// Posts events to an external realtime broadcast service.
///
/// `POST {base_url}/api/v1/broadcast/{call-new|call-updated|call-ended}`
/// with `{token, call, rooms}`. Without a token the notifier is disabled.
#[derive(Clone)]
pub struct RealtimeHttpNotifier {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RealtimeHttpNotifier {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        if token.is_none() {
            tracing::warn!("Realtime token not configured - realtime broadcasts disabled");
        }
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, event: &CallEvent) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            REALTIME_BROADCAST_PATH,
            event.kind.broadcast_path()
        )
    }
}

#[async_trait]
impl Notifier for RealtimeHttpNotifier {
    fn name(&self) -> &'static str {
        "realtime_http"
    }

    async fn publish(&self, event: &CallEvent, rooms: &[String]) -> Result<(), NotifyError> {
        let token = self.token.as_deref().ok_or_else(|| NotifyError::Disabled {
            reason: "no realtime token".to_string(),
        })?;

        let body = RealtimeBroadcast {
            token,
            call: &event.call,
            rooms,
        };
        let response = self
            .client
            .post(self.endpoint(event))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// BROADCASTER
// ============================================================================

/// Fans each event out to every registered notifier.
#[derive(Clone)]
pub struct Broadcaster {
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
    rooms: Arc<Vec<String>>,
    timeout: Duration,
}

impl Broadcaster {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>, rooms: Vec<String>, timeout: Duration) -> Self {
        Self {
            notifiers: Arc::new(notifiers),
            rooms: Arc::new(rooms),
            timeout,
        }
    }

    /// A broadcaster that drops every event.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Vec::new(), Duration::from_secs(1))
    }

    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    /// Fire-and-forget delivery.
    ///
    /// The returned handle completes when every notifier has finished or
    /// timed out; callers may drop it. It never carries an error.
    pub fn dispatch(&self, event: CallEvent) -> JoinHandle<()> {
        let event = Arc::new(event);
        let handles: Vec<JoinHandle<()>> = self
            .notifiers
            .iter()
            .cloned()
            .map(|notifier| {
                let event = Arc::clone(&event);
                let rooms = Arc::clone(&self.rooms);
                let timeout = self.timeout;
                tokio::spawn(async move {
                    deliver(notifier.as_ref(), &event, &rooms, timeout).await;
                })
            })
            .collect();

        tokio::spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Broadcast task panicked");
                }
            }
        })
    }
}

async fn deliver(notifier: &dyn Notifier, event: &CallEvent, rooms: &[String], timeout: Duration) {
    let kind = event.kind.as_str();
    let status = match tokio::time::timeout(timeout, notifier.publish(event, rooms)).await {
        Ok(Ok(())) => {
            tracing::debug!(
                notifier = notifier.name(),
                kind,
                event_id = %event.event_id,
                external_call_id = %event.call.call_id,
                "Broadcast delivered"
            );
            "success"
        }
        Ok(Err(NotifyError::Disabled { reason })) => {
            tracing::debug!(notifier = notifier.name(), kind, reason = %reason, "Broadcast skipped");
            "skipped"
        }
        Ok(Err(e)) => {
            tracing::warn!(
                notifier = notifier.name(),
                kind,
                event_id = %event.event_id,
                external_call_id = %event.call.call_id,
                error = %e,
                "Broadcast failed"
            );
            "failure"
        }
        Err(_) => {
            tracing::warn!(
                notifier = notifier.name(),
                kind,
                event_id = %event.event_id,
                timeout_ms = timeout.as_millis() as u64,
                "Broadcast timed out"
            );
            "timeout"
        }
    };
    if let Some(m) = metrics() {
        m.record_broadcast(kind, status);
    }
}
