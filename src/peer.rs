//! Peer definition
//!
//! Represents one connected party: its identity and the transport it
//! talks through.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::application::AppEvent;
use crate::error::TransportError;
use crate::message::ServerMessage;
use crate::registry::PeerRegistry;
use crate::transport::{Transport, TransportListener};
use crate::types::PeerKey;

/// Connected peer
///
/// Cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    key: PeerKey,
    transport: Arc<dyn Transport>,
    /// Registry to leave when the transport closes
    registry: PeerRegistry,
    events: broadcast::Sender<AppEvent>,
}

impl Peer {
    pub(crate) fn new(
        key: PeerKey,
        transport: Arc<dyn Transport>,
        registry: PeerRegistry,
        events: broadcast::Sender<AppEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                key,
                transport,
                registry,
                events,
            }),
        }
    }

    pub fn username(&self) -> &str {
        &self.inner.key.username
    }

    pub fn uuid(&self) -> &str {
        &self.inner.key.uuid
    }

    pub fn key(&self) -> &PeerKey {
        &self.inner.key
    }

    /// Send a text message to this peer
    ///
    /// Messages to a closed peer are dropped.
    pub fn send(&self, text: String) {
        match self.inner.transport.send(text) {
            Ok(()) => {}
            Err(TransportError::Closed) => {
                debug!("{} send() dropped, peer closed", self);
            }
            Err(e) => {
                warn!("{} send() failed: {}", self, e);
            }
        }
    }

    /// Serialize and send a server message
    pub fn send_message(&self, msg: &ServerMessage) {
        self.send_json(msg);
    }

    /// Push a notification to this peer
    pub fn notify(&self, method: impl Into<String>, path: impl Into<String>, data: Value) {
        self.send_message(&ServerMessage::Notification {
            method: method.into(),
            path: path.into(),
            data,
        });
    }

    /// Close the peer's transport; repeated calls are no-ops
    pub fn close(&self, code: u16, reason: &str) {
        self.inner.transport.close(code, reason);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.transport.is_closed()
    }

    /// Whether two handles refer to the same connection
    pub fn same_as(&self, other: &Peer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn send_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(e) => warn!("{} failed to serialize message: {}", self, e),
        }
    }
}

impl TransportListener for Peer {
    fn on_close(&self, code: u16, reason: &str, locally: bool) {
        info!(
            "{} offline [code:{} | reason:{} | locally closed:{}]",
            self, code, reason, locally
        );

        if self.inner.registry.remove(self) {
            let _ = self.inner.events.send(AppEvent::Offline {
                username: self.username().to_string(),
                uuid: self.uuid().to_string(),
                code,
                reason: reason.to_string(),
                locally,
            });
        }
    }

    fn on_error(&self, error: &TransportError) {
        warn!("{} transport error: {}", self, error);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[peer {} {}]", self.inner.key, self.inner.transport)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("username", &self.username())
            .field("uuid", &self.uuid())
            .field("closed", &self.is_closed())
            .finish()
    }
}
