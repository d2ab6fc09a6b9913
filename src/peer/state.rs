use crate::peer::feedback::NotificationSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webrtc::peer_connection::RTCPeerConnection;

/// ========== OUTBOUND CHANNEL SLOT ==========

pub type SharedSink = Arc<dyn NotificationSink>;

/// Latest opened outbound data channel of a session.
///
/// Written by the data-channel open callback, read by every feedback loop of
/// the session on each packet.
#[derive(Clone)]
pub struct OutboundSlot {
    tx: Arc<watch::Sender<Option<SharedSink>>>,
}

impl Default for OutboundSlot {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl OutboundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly opened channel, replacing whatever was there.
    pub fn set(&self, sink: SharedSink) {
        let previous = self.tx.send_replace(Some(sink));
        if let Some(prev) = previous {
            info!(label = %prev.channel_label(), "Outbound channel replaced");
        }
    }

    /// Empty the slot if it still holds `sink`; a newer channel is left alone.
    pub fn clear_if(&self, sink: &SharedSink) -> bool {
        self.tx.send_if_modified(|current| {
            let holds_sink = current
                .as_ref()
                .is_some_and(|c| Arc::as_ptr(c) as *const () == Arc::as_ptr(sink) as *const ());
            if holds_sink {
                *current = None;
            }
            holds_sink
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SharedSink>> {
        self.tx.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// ========== SESSION ==========

pub struct Session {
    pub id: String,
    pub connection: Arc<RTCPeerConnection>,
    pub outbound: OutboundSlot,
    /// Parent of every feedback loop token for this connection
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(id: String, connection: Arc<RTCPeerConnection>, outbound: OutboundSlot) -> Self {
        Self {
            id,
            connection,
            outbound,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the feedback loops and release the engine resources.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Err(e) = self.connection.close().await {
            warn!(session_id = %self.id, error = %e, "Failed to close peer connection");
        } else {
            info!(session_id = %self.id, "Peer connection closed");
        }
    }
}

/// ========== REGISTRY ==========

/// Sessions keyed by id. Only one peer is served at a time: installing a
/// session closes the ones before it.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `session` as the active one; every previous session is closed first.
    pub async fn replace(&self, session: Arc<Session>) {
        let stale: Vec<Arc<Session>> = {
            let mut map = self.lock();
            let stale = map.drain().map(|(_, s)| s).collect();
            map.insert(session.id.clone(), session.clone());
            stale
        };

        for old in stale {
            info!(
                session_id = %old.id,
                replaced_by = %session.id,
                "Releasing replaced session"
            );
            old.close().await;
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().remove(id)
    }

    /// The active session; `replace` keeps at most one.
    pub fn current(&self) -> Option<Arc<Session>> {
        self.lock().values().next().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub async fn close_all(&self) {
        let all: Vec<Arc<Session>> = self.lock().drain().map(|(_, s)| s).collect();
        for session in all {
            session.close().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
