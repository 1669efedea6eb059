//! WebSocket Call Broadcasting
//!
//! Observers connect to `GET /api/v1/ws` to receive live call events.
//!
//! ## Architecture
//!
//! - Uses tokio broadcast channel for event distribution
//! - Room subscriptions via `?rooms=operators,supervisors`; no rooms means all
//! - JSON-serialized events using the WsEvent enum

use crate::events::WsEvent;
use crate::telemetry::metrics;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket state shared across the application.
#[derive(Clone)]
pub struct WsState {
    /// Each connected client subscribes to this channel and filters by room.
    tx: broadcast::Sender<WsEvent>,
}

impl WsState {
    /// Create a new WebSocket state with the specified channel capacity.
    ///
    /// Slow consumers that fall more than `capacity` events behind lag and
    /// miss events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event to all connected clients.
    ///
    /// Non-blocking. With no clients connected the event is dropped.
    pub fn broadcast(&self, event: WsEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receiver_count) => {
                debug!(
                    event_type = event_type,
                    receivers = receiver_count,
                    "Broadcast event"
                );
            }
            Err(_) => {
                debug!(event_type = event_type, "No receivers for event");
            }
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Query parameters for the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Comma-separated room names
    pub rooms: Option<String>,
}

impl WsParams {
    fn room_list(&self) -> Vec<String> {
        self.rooms
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// WebSocket upgrade handler.
///
/// ## Protocol
///
/// 1. Client connects, optionally with `?rooms=...`
/// 2. Server sends a Connected event with the connection id and rooms
/// 3. Server streams call events addressed to those rooms
/// 4. On disconnect, server sends a Disconnected event
///
/// ```text
/// GET /api/v1/ws?rooms=operators
/// Upgrade: websocket
/// ```
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
    Query(params): Query<WsParams>,
) -> Response {
    let rooms = params.room_list();
    let connection_id = Uuid::now_v7();

    info!(
        connection_id = %connection_id,
        rooms = ?rooms,
        "WebSocket connection request"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id, rooms))
}

/// Handle an individual WebSocket connection for its whole lifetime.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<WsState>,
    connection_id: Uuid,
    rooms: Vec<String>,
) {
    info!(connection_id = %connection_id, "WebSocket connected");
    if let Some(m) = metrics() {
        m.ws_connected();
    }

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe();

    let connected_event = WsEvent::Connected {
        connection_id,
        rooms: rooms.clone(),
    };
    if let Err(e) = send_event(&mut sender, connected_event).await {
        error!(connection_id = %connection_id, error = %e, "Failed to send Connected event");
        if let Some(m) = metrics() {
            m.ws_disconnected();
        }
        return;
    }

    // Observers only listen; inbound frames are drained until close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %connection_id, "Client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if should_send_event(&event, &rooms) {
                            if let Err(e) = send_event(&mut sender, event).await {
                                error!(
                                    connection_id = %connection_id,
                                    error = %e,
                                    "Failed to send event, closing connection"
                                );
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            connection_id = %connection_id,
                            skipped = skipped,
                            "Client lagged, some events were dropped"
                        );
                        let error_event = WsEvent::Error {
                            message: format!("Lagged: {} events dropped", skipped),
                        };
                        if let Err(e) = send_event(&mut sender, error_event).await {
                            error!(connection_id = %connection_id, error = %e, "Failed to send error event");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(connection_id = %connection_id, "Broadcast channel closed");
                        break;
                    }
                }
            }

            _ = &mut recv_task => {
                debug!(connection_id = %connection_id, "Receiver task finished");
                break;
            }
        }
    }

    recv_task.abort();
    let disconnected_event = WsEvent::Disconnected {
        reason: "Connection closed".to_string(),
    };
    let _ = send_event(&mut sender, disconnected_event).await;

    if let Some(m) = metrics() {
        m.ws_disconnected();
    }
    info!(connection_id = %connection_id, "WebSocket disconnected");
}

/// Serialize an event to JSON and send it as a text message.
async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: WsEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(|e| {
        error!(error = %e, "Failed to serialize event");
        axum::Error::new(e)
    })?;

    sender.send(Message::Text(json.into())).await
}

/// Connection events always pass. Call events pass when the client
/// subscribed to no rooms, or shares at least one room with the event.
pub(crate) fn should_send_event(event: &WsEvent, client_rooms: &[String]) -> bool {
    match event.rooms() {
        None => true,
        Some(_) if client_rooms.is_empty() => true,
        Some(event_rooms) => event_rooms.iter().any(|r| client_rooms.contains(r)),
    }
}
