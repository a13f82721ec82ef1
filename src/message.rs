//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request expecting a response correlated by `id`
    Request {
        id: u64,
        method: String,
        path: String,
        #[serde(default)]
        data: Value,
    },
    /// Fire-and-forget notification
    Notification {
        method: String,
        path: String,
        #[serde(default)]
        data: Value,
    },
}

/// Server → Client message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Response to a client request
    Response {
        id: u64,
        status: u16,
        reason: String,
        #[serde(skip_serializing_if = "Value::is_null")]
        data: Value,
    },
    /// Notification pushed to the client
    Notification {
        method: String,
        path: String,
        #[serde(skip_serializing_if = "Value::is_null")]
        data: Value,
    },
}
