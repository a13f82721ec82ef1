//! Application: the configured router plus runtime state
//!
//! Owns the frozen router and settings, the registry of online peers and
//! the event channel. Shared by every connection as `Arc<Application>`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::RouteError;
use crate::message::ClientMessage;
use crate::peer::Peer;
use crate::registry::PeerRegistry;
use crate::request::Request;
use crate::router::Router;
use crate::settings::{Settings, ENV};
use crate::transport::Transport;
use crate::types::{Flow, PeerKey};

/// Event channel buffer size
const EVENT_CHANNEL_SIZE: usize = 64;

/// Close code sent to a peer replaced by a newer connection with the same identity
pub const CLOSE_REPLACED: u16 = 4000;

/// Close code used when the application shuts down
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Environment name that silences the final handler's log output
const TEST_ENV: &str = "test";

/// Notifications surfaced to the owning application
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A peer was registered
    Online { username: String, uuid: String },
    /// A registered peer's transport closed
    Offline {
        username: String,
        uuid: String,
        code: u16,
        reason: String,
        locally: bool,
    },
    /// An error reached the final handler
    RouteError {
        method: String,
        path: String,
        status: u16,
        message: String,
        /// Debug representation; omitted in production
        detail: Option<String>,
    },
}

/// How a dispatch pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A handler finished the exchange
    Handled,
    /// Nothing finished the exchange and no error occurred
    NotFound,
    /// An error reached the final handler
    Failed { status: u16, reason: String },
}

/// Configured application
pub struct Application {
    router: Router,
    settings: Settings,
    registry: PeerRegistry,
    events: broadcast::Sender<AppEvent>,
}

impl Application {
    /// Freeze a configured router and settings into an application
    pub fn new(router: Router, settings: Settings) -> Self {
        Self::with_registry(router, settings, PeerRegistry::new())
    }

    /// Like `new`, but share a registry handlers already hold a clone of
    pub fn with_registry(router: Router, settings: Settings, registry: PeerRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            router,
            settings,
            registry,
            events,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Subscribe to application events
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    /// Create a peer for a freshly handshaken transport and register it
    ///
    /// A peer already online with the same `(username, uuid)` is closed
    /// and replaced.
    pub fn attach_peer(
        &self,
        username: impl Into<String>,
        uuid: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Peer {
        let peer = Peer::new(
            PeerKey::new(username, uuid),
            transport.clone(),
            self.registry.clone(),
            self.events.clone(),
        );
        transport.attach(Arc::new(peer.clone()));

        if let Some(previous) = self.registry.insert(peer.clone()) {
            info!("{} replaced by a new connection", previous);
            previous.close(CLOSE_REPLACED, "replaced by new connection");
        }

        // Closed before the listener was attached; nobody will report it
        if transport.is_closed() {
            self.registry.remove(&peer);
            return peer;
        }

        info!("{} online (total peers: {})", peer, self.registry.peers(None, None));
        let _ = self.events.send(AppEvent::Online {
            username: peer.username().to_string(),
            uuid: peer.uuid().to_string(),
        });
        peer
    }

    /// Count online peers; see `PeerRegistry::peers`
    pub fn peers(&self, username: Option<&str>, uuid: Option<&str>) -> usize {
        self.registry.peers(username, uuid)
    }

    /// Visit online peers; see `PeerRegistry::each_peer`
    pub fn each_peer<F>(&self, username: Option<&str>, uuid: Option<&str>, callback: F) -> usize
    where
        F: FnMut(&Peer),
    {
        self.registry.each_peer(username, uuid, callback)
    }

    /// Close every online peer
    pub fn close(&self, code: u16, reason: &str) {
        let count = self.each_peer(None, None, |peer| peer.close(code, reason));
        info!("Closed {} peers", count);
    }

    /// Run one dispatch pass, including the final handler
    pub async fn dispatch(&self, req: &mut Request) -> Outcome {
        match self.router.dispatch(req, &self.settings).await {
            Ok(Flow::Done) => Outcome::Handled,
            Ok(Flow::Next) => {
                debug!("No handler finished {} {}", req.method, req.original_path());
                Outcome::NotFound
            }
            Err(err) => self.final_handler(req, err),
        }
    }

    /// Decode and dispatch one inbound text message from `peer`
    ///
    /// Requests nobody replied to are answered according to the outcome.
    pub async fn handle_message(&self, peer: &Peer, text: &str) {
        let msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Invalid JSON from {}: {}", peer, e);
                return;
            }
        };

        let mut req = Request::from_message(msg, peer.clone());
        debug!("{} {} {}", peer, req.method, req.path);

        let outcome = self.dispatch(&mut req).await;
        if req.is_replied() || !req.expects_reply() {
            return;
        }

        match outcome {
            Outcome::Handled => {}
            Outcome::NotFound => {
                req.reply(404, "Not Found");
            }
            Outcome::Failed { status, reason } => {
                req.reply(status, reason);
            }
        }
    }

    /// Turn an unresolved error into an `AppEvent::RouteError`
    fn final_handler(&self, req: &Request, err: RouteError) -> Outcome {
        let production = self.settings.is_production();
        let status = err.status();
        let detail = (!production).then(|| format!("{:?}", err));

        if self.settings.get_str(ENV) != Some(TEST_ENV) {
            match &detail {
                Some(detail) => error!(
                    "Unhandled error for {} {}: {} [{}]",
                    req.method,
                    req.original_path(),
                    err,
                    detail
                ),
                None => error!(
                    "Unhandled error for {} {}: {}",
                    req.method,
                    req.original_path(),
                    err
                ),
            }
        }

        let _ = self.events.send(AppEvent::RouteError {
            method: req.method.clone(),
            path: req.original_path().to_string(),
            status,
            message: err.to_string(),
            detail,
        });

        let reason = match err {
            RouteError::Rejected { reason, .. } => reason,
            _ if production => "Internal Server Error".to_string(),
            other => other.to_string(),
        };
        Outcome::Failed { status, reason }
    }
}
