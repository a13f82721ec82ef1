//! WebSocket Signaling Server - Entry Point
//!
//! Builds a demo router, starts the TCP listener and accepts connections
//! until Ctrl-C.

use std::env;
use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use signaling_router::application::CLOSE_GOING_AWAY;
use signaling_router::settings::ENV;
use signaling_router::{
    AppEvent, Application, Flow, PeerRegistry, RouteError, Router, Server, Settings,
};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Environment variable selecting the application env ("production" hides error detail)
const ENV_VAR: &str = "SIGNALING_ENV";

/// Demo routes: direct messages and invites between online users
fn build_router(registry: &PeerRegistry) -> Router {
    let mut router = Router::new();

    router.middleware(|req| {
        debug!("{} {}", req.method, req.path);
        Box::pin(async { Ok(Flow::Next) })
    });

    let online = registry.clone();
    router.param("user", move |_req, user| {
        let found = online.peers(Some(&user), None) > 0;
        Box::pin(async move {
            if found {
                Ok(())
            } else {
                Err(RouteError::rejected(404, format!("{} is not online", user)))
            }
        })
    });

    let targets = registry.clone();
    router.message("/users/:user", move |req| {
        let from = req
            .peer()
            .map(|peer| peer.username().to_string())
            .unwrap_or_default();
        let data = json!({ "from": from, "body": req.data.clone() });
        let path = req.path.clone();
        let user = req.param("user").map(str::to_string);

        let delivered = targets.each_peer(user.as_deref(), None, |peer| {
            peer.notify("message", path.clone(), data.clone());
        });
        let flow = req.reply_with(200, "OK", json!({ "delivered": delivered }));
        Box::pin(async move { Ok(flow) })
    });

    let callees = registry.clone();
    router.invite("/users/:user", move |req| {
        let from = req
            .peer()
            .map(|peer| peer.username().to_string())
            .unwrap_or_default();
        let data = json!({ "from": from, "offer": req.data.clone() });
        let path = req.path.clone();
        let user = req.param("user").map(str::to_string);

        let rung = callees.each_peer(user.as_deref(), None, |peer| {
            peer.notify("invite", path.clone(), data.clone());
        });
        let flow = req.reply_with(180, "Ringing", json!({ "rung": rung }));
        Box::pin(async move { Ok(flow) })
    });

    router.error_middleware(|err, req| {
        warn!("{} {} failed: {}", req.method, req.original_path(), err);
        Box::pin(async move { Err(err) })
    });

    router
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=signaling_router=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signaling_router=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let mut settings = Settings::new();
    if let Ok(app_env) = env::var(ENV_VAR) {
        settings.set(ENV, app_env);
    }

    let registry = PeerRegistry::new();
    let router = build_router(&registry);
    let app = Arc::new(Application::with_registry(router, settings, registry));

    // Log peer presence
    let mut events = app.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AppEvent::Online { username, uuid } => info!("{}#{} is online", username, uuid),
                AppEvent::Offline {
                    username,
                    uuid,
                    code,
                    reason,
                    ..
                } => info!("{}#{} went offline ({} {})", username, uuid, code, reason),
                AppEvent::RouteError { .. } => {}
            }
        }
    });

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;

    tokio::select! {
        _ = Server::new(app.clone()).run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    app.close(CLOSE_GOING_AWAY, "server shutting down");

    Ok(())
}
