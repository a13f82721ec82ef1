//! Inbound request
//!
//! One request is built per inbound message, walks one dispatch pass and
//! is then discarded.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::message::{ClientMessage, ServerMessage};
use crate::peer::Peer;
use crate::types::Flow;

/// A decoded request bound to the peer that sent it
#[derive(Debug)]
pub struct Request {
    /// Correlation id; `None` for notifications
    id: Option<u64>,
    /// Signaling method, lowercased
    pub method: String,
    /// Path relative to the router currently dispatching
    pub path: String,
    original_path: String,
    base_path: String,
    /// Parameters captured by the layer currently running
    pub params: HashMap<String, String>,
    /// Message payload
    pub data: Value,
    peer: Option<Peer>,
    replied: bool,
}

impl Request {
    /// Create a request that is not bound to any peer
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: None,
            method: method.into().to_lowercase(),
            original_path: path.clone(),
            path,
            base_path: String::new(),
            params: HashMap::new(),
            data: Value::Null,
            peer: None,
            replied: false,
        }
    }

    /// Build a request from a decoded client message
    pub fn from_message(msg: ClientMessage, peer: Peer) -> Self {
        let (id, method, path, data) = match msg {
            ClientMessage::Request {
                id,
                method,
                path,
                data,
            } => (Some(id), method, path, data),
            ClientMessage::Notification { method, path, data } => (None, method, path, data),
        };

        let mut req = Self::new(method, path).with_peer(peer).with_data(data);
        req.id = id;
        req
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// The peer that sent this request
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    /// Full path as received
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    /// Mount prefix stripped by enclosing sub-routers
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Whether a response was already sent
    pub fn is_replied(&self) -> bool {
        self.replied
    }

    /// Whether the sender expects a response
    pub fn expects_reply(&self) -> bool {
        self.id.is_some()
    }

    /// Send a response and finish the exchange
    pub fn reply(&mut self, status: u16, reason: impl Into<String>) -> Flow {
        self.reply_with(status, reason, Value::Null)
    }

    /// Send a response carrying data and finish the exchange
    ///
    /// Only the first reply is sent; notifications are never answered.
    pub fn reply_with(&mut self, status: u16, reason: impl Into<String>, data: Value) -> Flow {
        if self.replied {
            debug!("Request {} {} already replied", self.method, self.original_path);
            return Flow::Done;
        }
        self.replied = true;

        if let (Some(id), Some(peer)) = (self.id, self.peer.as_ref()) {
            peer.send_message(&ServerMessage::Response {
                id,
                status,
                reason: reason.into(),
                data,
            });
        }
        Flow::Done
    }

    /// Enter a sub-router mounted at `matched_len` bytes into the current path
    ///
    /// Returns the previous `(path, base_path)` for `leave_mount`.
    pub(crate) fn enter_mount(&mut self, matched_len: usize) -> (String, String) {
        let remaining = match &self.path[matched_len..] {
            "" => "/".to_string(),
            rest if rest.starts_with('/') => rest.to_string(),
            rest => format!("/{}", rest),
        };
        let base_path = format!("{}{}", self.base_path, &self.path[..matched_len]);

        let saved_path = std::mem::replace(&mut self.path, remaining);
        let saved_base = std::mem::replace(&mut self.base_path, base_path);
        (saved_path, saved_base)
    }

    pub(crate) fn leave_mount(&mut self, saved: (String, String)) {
        self.path = saved.0;
        self.base_path = saved.1;
    }
}
