//! Scripted collaborators for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calltrail_api::events::{CallEvent, CallEventKind};
use calltrail_api::notifier::Notifier;
use calltrail_api::provider::RecordingProvider;
use calltrail_core::{NotifyError, ProviderError};
use tokio::sync::mpsc;

/// Audio the scripted provider returns when nothing else is queued.
pub const FAKE_AUDIO: &[u8] = b"ID3\x04\x00fake-mp3-frames";

/// Recording provider that replays queued responses, then serves
/// [`FAKE_AUDIO`].
#[derive(Default)]
pub struct ScriptedRecordingProvider {
    responses: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedRecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<Vec<u8>, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Sleep before answering, for timeout tests.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordingProvider for ScriptedRecordingProvider {
    async fn fetch_recording(&self, _recording_id: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(FAKE_AUDIO.to_vec()))
    }
}

/// Notifier that forwards every event to a channel.
pub struct CollectingNotifier {
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl CollectingNotifier {
    pub fn new() -> (Arc<Self>, EventSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), EventSink { rx })
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    fn name(&self) -> &'static str {
        "collecting"
    }

    async fn publish(&self, event: &CallEvent, _rooms: &[String]) -> Result<(), NotifyError> {
        self.tx.send(event.clone()).map_err(|e| NotifyError::Request {
            reason: e.to_string(),
        })
    }
}

/// Receiving end of a [`CollectingNotifier`].
pub struct EventSink {
    rx: mpsc::UnboundedReceiver<CallEvent>,
}

impl EventSink {
    /// Next event, or `None` if nothing arrives within a second.
    pub async fn next(&mut self) -> Option<CallEvent> {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Kinds of the next `n` events.
    pub async fn kinds(&mut self, n: usize) -> Vec<CallEventKind> {
        let mut kinds = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next().await {
                Some(event) => kinds.push(event.kind),
                None => break,
            }
        }
        kinds
    }

    /// True when no further event shows up within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.rx.recv()).await.is_err()
    }
}
