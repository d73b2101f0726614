//! src/eventbus/mod.rs
//!
//! In-process fan-out from the ingestion side to the trigger side, plus the
//! process-wide shutdown signal every long-lived task watches.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;
use livespot_common::models::{AuthMethod, NormalizedMessage, NormalizedViewer};

#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// A validated chat/tip row, already handed to the batch writer.
    Message(NormalizedMessage),

    /// One viewer-list poll after normalization.
    ViewerSnapshot {
        account_id: String,
        cast_name: String,
        viewers: Vec<NormalizedViewer>,
    },

    SessionStarted {
        account_id: String,
        cast_name: String,
        session_id: Uuid,
    },

    SessionEnded {
        account_id: String,
        cast_name: String,
        session_id: Option<Uuid>,
    },

    CredentialRefreshed {
        method: Option<AuthMethod>,
    },
}

impl LiveEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LiveEvent::Message(_) => "message",
            LiveEvent::ViewerSnapshot { .. } => "viewer_snapshot",
            LiveEvent::SessionStarted { .. } => "session.start",
            LiveEvent::SessionEnded { .. } => "session.end",
            LiveEvent::CredentialRefreshed { .. } => "credential.refreshed",
        }
    }
}

/// Each subscriber gets its own bounded `mpsc` queue; `publish` awaits when
/// a subscriber's buffer is full.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<LiveEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 10000;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<LiveEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish to all live subscribers; closed receivers are pruned.
    pub async fn publish(&self, event: LiveEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
