//! WebSocket connection handler
//!
//! Handles individual peer connections: WebSocket handshake with identity
//! extraction, inbound message dispatch, and outbound writes.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::application::Application;
use crate::error::{AppError, TransportError};
use crate::transport::WebSocketTransport;

/// Close code reported when the connection drops without a close frame
const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported when a close frame carries no status
const CLOSE_NO_STATUS: u16 = 1005;

/// Identity presented in the upgrade URL (`?username=..&uuid=..`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub username: String,
    pub uuid: Option<String>,
}

impl Handshake {
    /// Extract the identity from a URL query string
    pub fn from_query(query: Option<&str>) -> Result<Self, AppError> {
        let username = get_query_param(query, "username")
            .filter(|username| !username.is_empty())
            .ok_or_else(|| AppError::Handshake("missing username".to_string()))?;
        let uuid = get_query_param(query, "uuid")
            .filter(|uuid| !uuid.is_empty())
            .map(str::to_string);

        Ok(Self {
            username: username.to_string(),
            uuid,
        })
    }
}

/// Get query parameter from a URI query
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key {
            Some(v)
        } else {
            None
        }
    })
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the peer, and pumps
/// messages until either side goes away.
pub async fn handle_connection(stream: TcpStream, app: Arc<Application>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake; reject upgrades without a username
    let mut handshake = None;
    let callback = |req: &HandshakeRequest, response: HandshakeResponse| {
        match Handshake::from_query(req.uri().query()) {
            Ok(identity) => {
                handshake = Some(identity);
                Ok(response)
            }
            Err(e) => {
                let mut rejection = ErrorResponse::new(Some(e.to_string()));
                *rejection.status_mut() = StatusCode::BAD_REQUEST;
                Err(rejection)
            }
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let handshake =
        handshake.ok_or_else(|| AppError::Handshake("no identity presented".to_string()))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for transport -> WebSocket frames
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
    let transport = Arc::new(WebSocketTransport::new(peer_addr.clone(), msg_tx));

    let peer = app.attach_peer(handshake.username, handshake.uuid, transport.clone());
    info!("{} connected from {}", peer, peer_addr);

    // Spawn read task (WebSocket -> dispatch loop)
    let read_transport = transport.clone();
    let read_peer = peer.clone();
    let read_app = app.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    read_transport.on_remote_close(code, &reason);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping/pong from {}", read_peer);
                }
                Ok(msg) => {
                    // One message at a time keeps a peer's requests ordered
                    if let Some(text) = read_transport.receive(msg) {
                        read_app.handle_message(&read_peer, &text).await;
                    }
                }
                Err(e) => {
                    read_transport.on_error(TransportError::from(e));
                    break;
                }
            }
        }
        read_transport.on_remote_close(CLOSE_ABNORMAL, "connection lost");
        debug!("Read task ended for {}", read_peer);
    });

    // Spawn write task (transport -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                debug!("WebSocket send failed, ending write task");
                break;
            }
            if closing {
                break;
            }
        }
        debug!("Write task ended for client");

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", peer);
        }
        _ = write_task => {
            debug!("Write task completed for {}", peer);
        }
    }

    // No-op if the transport already reported its close
    transport.on_remote_close(CLOSE_ABNORMAL, "connection lost");

    info!("{} disconnected", peer);

    Ok(())
}
