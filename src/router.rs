//! Router and dispatch loop
//!
//! # Responsibilities
//! - Keep the ordered stack of layers (middleware, error middleware,
//!   routes, mounted sub-routers)
//! - Walk the stack once per request, matching path and method
//! - Run parameter middleware before the first layer that captures a name
//! - Route errors to the next error-aware layer
//!
//! # Design Decisions
//! - The loop is an explicit state machine: an iterator over the stack plus
//!   a "current error" slot. `Flow::Done` is the only way to finish early
//! - The stack is append-only during setup and read-only while dispatching,
//!   so no locking is needed
//! - A handler panic is caught and treated like a returned error

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use crate::error::RouteError;
use crate::layer::{guarded, HandlerResult, Layer, LayerKind, ParamHandler};
use crate::path::PathMatch;
use crate::request::Request;
use crate::route::Route;
use crate::settings::{Settings, CASE_SENSITIVE_ROUTING, STRICT_ROUTING};
use crate::types::Flow;

/// Ordered stack of layers plus parameter middleware
#[derive(Default)]
pub struct Router {
    stack: Vec<Layer>,
    params: HashMap<String, Vec<ParamHandler>>,
}

/// Raw and resolved value of a parameter whose middleware already ran
struct ResolvedParam {
    raw: String,
    value: String,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of layers on the stack
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Register middleware for every path
    pub fn middleware<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        self.middleware_at("/", handler)
    }

    /// Register middleware for paths under `path`
    pub fn middleware_at<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        self.stack.push(Layer::middleware(path, Arc::new(handler)));
        self
    }

    /// Register an error-aware handler for every path
    pub fn error_middleware<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'r> Fn(RouteError, &'r mut Request) -> BoxFuture<'r, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.error_middleware_at("/", handler)
    }

    /// Register an error-aware handler for paths under `path`
    pub fn error_middleware_at<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(RouteError, &'r mut Request) -> BoxFuture<'r, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.stack.push(Layer::error_middleware(path, Arc::new(handler)));
        self
    }

    /// Mount a sub-router under `path`
    ///
    /// The sub-router sees paths with the mount prefix stripped.
    pub fn mount(&mut self, path: &str, router: Router) -> &mut Self {
        self.stack.push(Layer::router(path, router));
        self
    }

    /// Create a route for an exact path and return it for chaining
    pub fn route(&mut self, path: &str) -> &mut Route {
        self.stack.push(Layer::route(Route::new(path)));
        match self.stack.last_mut().map(|layer| &mut layer.kind) {
            Some(LayerKind::Route(route)) => route,
            _ => unreachable!("a route layer was just pushed"),
        }
    }

    /// Register a handler for every method on an exact path
    pub fn all<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        self.route(path).all(handler);
        self
    }

    /// Register a handler for one method on an exact path
    pub fn method<F>(&mut self, method: &str, path: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        self.route(path).method(method, handler);
        self
    }

    router_verbs!(
        register, invite, ack, bye, cancel, message, info, options, subscribe, notify, publish,
        refer, update,
    );

    /// Register parameter middleware for `name`
    ///
    /// Runs with the raw captured value before the first matching layer
    /// that captures `name`, at most once per dispatch pass. It may rewrite
    /// `req.params[name]`; the rewritten value is kept for later layers
    /// capturing the same value.
    pub fn param<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request, String) -> BoxFuture<'r, Result<(), RouteError>>
            + Send
            + Sync
            + 'static,
    {
        self.params
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Walk the stack for one request
    ///
    /// - `Ok(Flow::Done)`: a handler finished the exchange
    /// - `Ok(Flow::Next)`: the stack was exhausted without an error
    /// - `Err(e)`: the stack was exhausted while in the error state
    pub(crate) fn dispatch<'a>(
        &'a self,
        req: &'a mut Request,
        settings: &'a Settings,
    ) -> BoxFuture<'a, HandlerResult> {
        async move {
            let strict = settings.enabled(STRICT_ROUTING);
            let case_sensitive = settings.enabled(CASE_SENSITIVE_ROUTING);

            let mut error: Option<RouteError> = None;
            let mut resolved: HashMap<String, ResolvedParam> = HashMap::new();

            for layer in &self.stack {
                // Ordinary layers run without an error, error-aware ones only with one
                if error.is_some() != layer.is_error_aware() {
                    continue;
                }
                let Some(matched) = layer.matches(&req.path, strict, case_sensitive) else {
                    continue;
                };
                if let LayerKind::Route(route) = &layer.kind {
                    if !route.handles_method(&req.method) {
                        continue;
                    }
                }

                debug!("{} {} matched layer {}", req.method, req.path, layer.path());
                req.params = matched.params.iter().cloned().collect();

                let result = match &layer.kind {
                    LayerKind::ErrorMiddleware(handler) => match error.take() {
                        Some(err) => guarded(|| handler(err, &mut *req)).await,
                        None => continue,
                    },
                    kind => {
                        if let Err(err) = self.process_params(&matched, req, &mut resolved).await {
                            debug!("{} {} param middleware failed: {}", req.method, req.path, err);
                            error = Some(err);
                            continue;
                        }

                        match kind {
                            LayerKind::Middleware(handler) => {
                                guarded(|| handler(&mut *req)).await
                            }
                            LayerKind::Route(route) => route.dispatch(req).await,
                            LayerKind::Router(router) => {
                                let saved = req.enter_mount(matched.matched_len);
                                let result = router.dispatch(req, settings).await;
                                req.leave_mount(saved);
                                result
                            }
                            LayerKind::ErrorMiddleware(_) => continue,
                        }
                    }
                };

                match result {
                    Ok(Flow::Next) => {}
                    Ok(Flow::Done) => return Ok(Flow::Done),
                    Err(err) => {
                        debug!("{} {} raised: {}", req.method, req.path, err);
                        error = Some(err);
                    }
                }
            }

            match error {
                Some(err) => Err(err),
                None => Ok(Flow::Next),
            }
        }
        .boxed()
    }

    async fn process_params(
        &self,
        matched: &PathMatch,
        req: &mut Request,
        resolved: &mut HashMap<String, ResolvedParam>,
    ) -> Result<(), RouteError> {
        for (name, raw) in &matched.params {
            if let Some(previous) = resolved.get(name) {
                if previous.raw == *raw {
                    req.params.insert(name.clone(), previous.value.clone());
                }
                continue;
            }

            resolved.insert(
                name.clone(),
                ResolvedParam {
                    raw: raw.clone(),
                    value: raw.clone(),
                },
            );

            let Some(handlers) = self.params.get(name) else {
                continue;
            };
            for handler in handlers {
                guarded(|| handler(&mut *req, raw.clone())).await?;
            }

            if let (Some(entry), Some(value)) = (resolved.get_mut(name), req.params.get(name)) {
                entry.value = value.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Handler that records `name` plus the request path and returns `flow`
    fn probe(
        log: &Log,
        name: &'static str,
        flow: Flow,
    ) -> impl for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static
    {
        let log = log.clone();
        move |req| {
            log.lock().unwrap().push(format!("{} {}", name, req.path));
            Box::pin(async move { Ok(flow) })
        }
    }

    fn failing(
        message: &'static str,
    ) -> impl for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static
    {
        move |_req| Box::pin(async move { Err(RouteError::msg(message)) })
    }

    async fn run(router: &Router, settings: &Settings, method: &str, path: &str) -> HandlerResult {
        let mut req = Request::new(method, path);
        router.dispatch(&mut req, settings).await
    }

    #[tokio::test]
    async fn test_layers_run_in_registration_order() {
        let log = log();
        let mut router = Router::new();
        router
            .middleware(probe(&log, "one", Flow::Next))
            .middleware_at("/NO", probe(&log, "never", Flow::Next))
            .middleware_at("/users/", probe(&log, "two", Flow::Next))
            .invite("/users/:user", probe(&log, "three", Flow::Next))
            .bye("/users/:user", probe(&log, "never", Flow::Next))
            .middleware(probe(&log, "four", Flow::Done))
            .middleware(probe(&log, "never", Flow::Next));

        let result = run(&router, &Settings::new(), "invite", "/users/alice").await;

        assert_eq!(result.unwrap(), Flow::Done);
        assert_eq!(
            entries(&log),
            vec![
                "one /users/alice",
                "two /users/alice",
                "three /users/alice",
                "four /users/alice",
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_stack_is_next() {
        let log = log();
        let mut router = Router::new();
        router.invite("/users/:user", probe(&log, "never", Flow::Next));

        let result = run(&router, &Settings::new(), "invite", "/rooms/1").await;
        assert_eq!(result.unwrap(), Flow::Next);
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_strict_routing() {
        let log = log();
        let mut router = Router::new();
        router
            .route("/:folder/:user")
            .invite(probe(&log, "plain", Flow::Next));
        router.invite("/:folder/:user/", probe(&log, "slashed", Flow::Next));

        let mut strict = Settings::new();
        strict.enable(STRICT_ROUTING);
        run(&router, &strict, "invite", "/users/alice").await.unwrap();
        run(&router, &strict, "invite", "/users/alice/").await.unwrap();
        assert_eq!(
            entries(&log),
            vec!["plain /users/alice", "slashed /users/alice/"]
        );

        log.lock().unwrap().clear();
        run(&router, &Settings::new(), "invite", "/users/alice/").await.unwrap();
        assert_eq!(
            entries(&log),
            vec!["plain /users/alice/", "slashed /users/alice/"]
        );
    }

    #[tokio::test]
    async fn test_params_captured_and_middleware_runs_once() {
        let log = log();
        let mut router = Router::new();

        let param_log = log.clone();
        router.param("user", move |req, value| {
            param_log.lock().unwrap().push(format!("param user={}", value));
            req.params.insert("user".to_string(), value.to_uppercase());
            Box::pin(async { Ok(()) })
        });

        for name in ["first", "second"] {
            let seen = log.clone();
            router.all("/:folder/:user", move |req| {
                seen.lock().unwrap().push(format!(
                    "{} folder={} user={}",
                    name,
                    req.param("folder").unwrap_or("-"),
                    req.param("user").unwrap_or("-"),
                ));
                Box::pin(async { Ok(Flow::Next) })
            });
        }

        run(&router, &Settings::new(), "invite", "/users/alice").await.unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "param user=alice",
                "first folder=users user=ALICE",
                "second folder=users user=ALICE",
            ]
        );
    }

    #[tokio::test]
    async fn test_param_error_skips_layer() {
        let log = log();
        let mut router = Router::new();
        router
            .param("user", |_req, _value| {
                Box::pin(async { Err(RouteError::rejected(404, "no such user")) })
            })
            .invite("/users/:user", probe(&log, "never", Flow::Done));

        let err = run(&router, &Settings::new(), "invite", "/users/bob")
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_error_skips_plain_layers() {
        let log = log();
        let mut router = Router::new();
        router
            .all("/users/:user", failing("BUMP"))
            .all("/users/:user", probe(&log, "never", Flow::Next))
            .middleware(probe(&log, "never", Flow::Next));

        let err = run(&router, &Settings::new(), "invite", "/users/alice")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "BUMP");
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_an_error() {
        let log = log();
        let mut router = Router::new();
        router
            .all("/users/:user", |_req| {
                Box::pin(async {
                    let fail = true;
                    if fail {
                        panic!("BUMP");
                    }
                    Ok(Flow::Next)
                })
            })
            .all("/users/:user", probe(&log, "never", Flow::Next));

        let err = run(&router, &Settings::new(), "invite", "/users/alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Panic(ref m) if m == "BUMP"));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_handler_body_reaches_error_middleware() {
        let log = log();
        let mut router = Router::new();
        router
            .all("/users/:user", |req| {
                let missing = req.param("nope").unwrap().to_string();
                Box::pin(async move { Err(RouteError::msg(missing)) })
            })
            .all("/users/:user", probe(&log, "never", Flow::Next));

        let seen = log.clone();
        router.error_middleware(move |err, _req| {
            seen.lock().unwrap().push(format!("caught {}", err));
            Box::pin(async { Ok(Flow::Done) })
        });

        let result = run(&router, &Settings::new(), "invite", "/users/alice").await;

        assert_eq!(result.unwrap(), Flow::Done);
        assert_eq!(
            entries(&log),
            vec!["caught Handler panicked: called `Option::unwrap()` on a `None` value"]
        );
    }

    #[tokio::test]
    async fn test_panic_in_param_body_is_an_error() {
        let log = log();
        let mut router = Router::new();
        router
            .param("user", |_req, value| {
                let id: u32 = value.parse().unwrap();
                Box::pin(async move {
                    if id > 0 {
                        Ok(())
                    } else {
                        Err(RouteError::msg("zero"))
                    }
                })
            })
            .invite("/users/:user", probe(&log, "never", Flow::Done));

        let err = run(&router, &Settings::new(), "invite", "/users/alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Panic(ref m) if m.contains("ParseIntError")));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_error_middleware_body_is_an_error() {
        let mut router = Router::new();
        router
            .middleware(failing("BUMP"))
            .error_middleware(|err, _req| {
                let status: u16 = err.to_string().parse().unwrap();
                Box::pin(async move { Err(RouteError::rejected(status, "unreachable")) })
            });

        let err = run(&router, &Settings::new(), "invite", "/users/alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Panic(_)));
    }

    #[tokio::test]
    async fn test_error_middleware_resolves() {
        let log = log();
        let mut router = Router::new();

        let error_log = log.clone();
        router
            .error_middleware(probe_error(&log, "unused"))
            .middleware(failing("BUMP"))
            .middleware(probe(&log, "skipped", Flow::Next))
            .error_middleware(move |err, _req| {
                error_log.lock().unwrap().push(format!("caught {}", err));
                Box::pin(async { Ok(Flow::Next) })
            })
            .error_middleware(probe_error(&log, "not in error state"))
            .middleware(probe(&log, "after", Flow::Next));

        let result = run(&router, &Settings::new(), "invite", "/").await;

        assert_eq!(result.unwrap(), Flow::Next);
        assert_eq!(entries(&log), vec!["caught BUMP", "after /"]);
    }

    #[tokio::test]
    async fn test_error_middleware_reraises() {
        let mut router = Router::new();
        router
            .middleware(failing("BUMP"))
            .error_middleware(|err, _req| {
                Box::pin(async move { Err(RouteError::msg(format!("wrapped: {}", err))) })
            });

        let err = run(&router, &Settings::new(), "invite", "/").await.unwrap_err();
        assert_eq!(err.to_string(), "wrapped: BUMP");
    }

    fn probe_error(
        log: &Log,
        name: &'static str,
    ) -> impl for<'r> Fn(RouteError, &'r mut Request) -> BoxFuture<'r, HandlerResult>
           + Send
           + Sync
           + 'static {
        let log = log.clone();
        move |err, _req| {
            log.lock().unwrap().push(format!("{} {}", name, err));
            Box::pin(async { Ok(Flow::Next) })
        }
    }

    #[tokio::test]
    async fn test_mounted_router_sees_stripped_path() {
        let log = log();

        let mut sub = Router::new();
        let seen = log.clone();
        sub.invite("/:user", move |req| {
            seen.lock().unwrap().push(format!(
                "sub path={} base={} original={} user={}",
                req.path,
                req.base_path(),
                req.original_path(),
                req.param("user").unwrap_or("-"),
            ));
            Box::pin(async { Ok(Flow::Next) })
        });

        let mut router = Router::new();
        router
            .mount("/users", sub)
            .middleware(probe(&log, "after", Flow::Done));

        let result = run(&router, &Settings::new(), "invite", "/users/alice").await;

        assert_eq!(result.unwrap(), Flow::Done);
        assert_eq!(
            entries(&log),
            vec![
                "sub path=/alice base=/users original=/users/alice user=alice",
                "after /users/alice",
            ]
        );
    }

    #[tokio::test]
    async fn test_mounted_router_error_reaches_parent() {
        let log = log();

        let mut sub = Router::new();
        sub.middleware(failing("inner"));

        let mut router = Router::new();
        router
            .mount("/api", sub)
            .middleware(probe(&log, "never", Flow::Next))
            .error_middleware(probe_error(&log, "caught"));

        let result = run(&router, &Settings::new(), "invite", "/api/x").await;

        assert_eq!(result.unwrap(), Flow::Next);
        assert_eq!(entries(&log), vec!["caught inner"]);
    }

    #[tokio::test]
    async fn test_case_sensitivity_setting() {
        let log = log();
        let mut router = Router::new();
        router.all("/USERS/:user", probe(&log, "upper", Flow::Next));

        run(&router, &Settings::new(), "invite", "/users/alice").await.unwrap();
        assert!(entries(&log).is_empty());

        let mut insensitive = Settings::new();
        insensitive.disable(CASE_SENSITIVE_ROUTING);
        run(&router, &insensitive, "invite", "/users/alice").await.unwrap();
        assert_eq!(entries(&log), vec!["upper /users/alice"]);
    }
}
