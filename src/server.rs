//! Signaling server accept loop
//!
//! Accepts TCP connections and spawns one connection handler task per
//! socket, all sharing the same `Application`.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::application::Application;
use crate::handler::handle_connection;

/// The signaling server
pub struct Server {
    app: Arc<Application>,
}

impl Server {
    /// Create a server for the given application
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }

    /// Run the accept loop
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn run(self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Signaling server listening on {}", addr),
            Err(e) => error!("Failed to read listener address: {}", e),
        }

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let app = self.app.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, app).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
