//! Transport abstraction
//!
//! A transport owns one physical connection. It frames outbound text,
//! filters inbound frames, and notifies the attached listener (the Peer)
//! exactly once when the connection goes away, whichever side closed it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Receives lifecycle notifications from a transport
pub trait TransportListener: Send + Sync {
    /// The connection closed; called at most once per transport
    fn on_close(&self, code: u16, reason: &str, locally: bool);

    /// The connection reported an error; `on_close` follows separately
    fn on_error(&self, error: &TransportError);
}

/// A bidirectional, message-oriented connection
pub trait Transport: Send + Sync + fmt::Display {
    /// Attach the listener that receives lifecycle notifications
    fn attach(&self, listener: Arc<dyn TransportListener>);

    /// Send a text message
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection; repeated calls are no-ops
    fn close(&self, code: u16, reason: &str);

    /// Whether the connection is closed
    fn is_closed(&self) -> bool;
}

/// WebSocket transport
///
/// Outbound frames go through a channel to the connection's writer task,
/// so sending never blocks the dispatch loop.
pub struct WebSocketTransport {
    /// Remote address, for logging
    remote: String,
    /// Transport → writer task channel; dropped on close
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    closed: AtomicBool,
    listener: Mutex<Option<Arc<dyn TransportListener>>>,
}

impl WebSocketTransport {
    /// Create a transport writing to the given channel
    pub fn new(remote: impl Into<String>, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            remote: remote.into(),
            outbound: Mutex::new(Some(outbound)),
            closed: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Filter an inbound frame
    ///
    /// Returns the text payload to dispatch, or `None` for frames that are
    /// ignored (binary, control frames, anything after close).
    pub fn receive(&self, message: Message) -> Option<String> {
        if self.is_closed() {
            return None;
        }

        match message {
            Message::Text(text) => Some(text.to_string()),
            Message::Binary(_) => {
                debug!("{} ignoring binary message", self);
                None
            }
            _ => None,
        }
    }

    /// The remote side closed the connection, or it was lost
    pub fn on_remote_close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("{} closed remotely [code:{} | reason:{}]", self, code, reason);

        self.take_outbound();
        if let Some(listener) = self.take_listener() {
            listener.on_close(code, reason, false);
        }
    }

    /// The connection reported an error
    pub fn on_error(&self, error: TransportError) {
        warn!("{} error: {}", self, error);

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.on_error(&error);
        }
    }

    fn take_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn take_outbound(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Transport for WebSocketTransport {
    fn attach(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx
                .send(Message::Text(text.into()))
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("{} close() [code:{} | reason:{}]", self, code, reason);

        // Don't wait for the remote close frame
        if let Some(listener) = self.take_listener() {
            listener.on_close(code, reason, true);
        }

        if let Some(tx) = self.take_outbound() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_owned().into(),
            };
            if tx.send(Message::Close(Some(frame))).is_err() {
                debug!("{} writer already gone", self);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Display for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[WS | address:{}]", self.remote)
    }
}
