//! WebSocket Signaling Router Library
//!
//! Path-based request routing for real-time signaling servers. Connected
//! peers send requests (`method` + `path`); the application registers
//! ordered middleware and routes that process them, and keeps a
//! queryable registry of online peers.
//!
//! # Features
//! - Express-style middleware stack with prefix and exact path matching
//! - Named path parameters (`/:folder/:user`) and parameter middleware
//! - Strict / loose trailing-slash matching via the `"strict routing"` setting
//! - Error propagation to error-aware middleware, then to a final handler
//! - Mountable sub-routers
//! - Registry of online peers queryable by username and uuid
//!
//! # Architecture
//! - `Router` holds the layer stack and runs the dispatch loop
//! - `Application` freezes a router and its settings, and owns the registry
//! - Each connection has a `handler` task that dispatches that peer's
//!   messages one at a time
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use signaling_router::{Application, Flow, Router, Server, Settings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut router = Router::new();
//!     router.invite("/users/:user", |req| {
//!         let flow = req.reply(200, "OK");
//!         Box::pin(async move { Ok(flow) })
//!     });
//!
//!     let app = Arc::new(Application::new(router, Settings::new()));
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     Server::new(app).run(listener).await;
//! }
//! ```

#[macro_use]
mod method;

pub mod application;
pub mod error;
pub mod handler;
pub mod layer;
pub mod message;
pub mod path;
pub mod peer;
pub mod registry;
pub mod request;
pub mod route;
pub mod router;
pub mod server;
pub mod settings;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use application::{AppEvent, Application, Outcome};
pub use error::{AppError, RouteError, TransportError};
pub use handler::handle_connection;
pub use layer::{ErrorHandler, Handler, HandlerResult, ParamHandler};
pub use message::{ClientMessage, ServerMessage};
pub use method::METHODS;
pub use peer::Peer;
pub use registry::PeerRegistry;
pub use request::Request;
pub use route::Route;
pub use router::Router;
pub use server::Server;
pub use settings::Settings;
pub use transport::{Transport, TransportListener, WebSocketTransport};
pub use types::{Flow, PeerKey};
