//! Route: method-scoped handlers sharing one exact path
//!
//! The path is compiled once when the route is created; every handler
//! appended afterwards reuses it.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::layer::{guarded, Handler, HandlerResult};
use crate::method::METHODS;
use crate::path::PathPattern;
use crate::request::Request;
use crate::types::Flow;

struct RouteLayer {
    /// `None` accepts every method
    method: Option<String>,
    handler: Handler,
}

impl RouteLayer {
    fn accepts(&self, method: &str) -> bool {
        self.method.as_deref().map_or(true, |m| m == method)
    }
}

/// Ordered method-scoped handlers bound to one path
pub struct Route {
    pattern: PathPattern,
    layers: Vec<RouteLayer>,
}

impl Route {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            pattern: PathPattern::parse(path),
            layers: Vec::new(),
        }
    }

    pub(crate) fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    /// Append a handler for every method
    pub fn all<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        self.push(None, Arc::new(handler))
    }

    /// Append a handler for one method
    pub fn method<F>(&mut self, method: &str, handler: F) -> &mut Self
    where
        F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static,
    {
        let method = method.to_lowercase();
        if !METHODS.contains(&method.as_str()) {
            debug!("Route {} handles non-standard method {}", self.path(), method);
        }
        self.push(Some(method), Arc::new(handler))
    }

    route_verbs!(
        register, invite, ack, bye, cancel, message, info, options, subscribe, notify, publish,
        refer, update,
    );

    /// Methods this route has handlers for; `None` if it accepts every method
    pub fn methods(&self) -> Option<Vec<&str>> {
        let mut methods = Vec::new();
        for layer in &self.layers {
            match &layer.method {
                None => return None,
                Some(m) if !methods.contains(&m.as_str()) => methods.push(m.as_str()),
                Some(_) => {}
            }
        }
        Some(methods)
    }

    pub(crate) fn handles_method(&self, method: &str) -> bool {
        self.layers.iter().any(|layer| layer.accepts(method))
    }

    /// Run the handlers accepting the request's method, in order
    ///
    /// An error leaves the route immediately and is handed back to the
    /// router's loop.
    pub(crate) async fn dispatch(&self, req: &mut Request) -> HandlerResult {
        for layer in &self.layers {
            if !layer.accepts(&req.method) {
                continue;
            }
            if guarded(|| (layer.handler)(&mut *req)).await? == Flow::Done {
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Next)
    }

    fn push(&mut self, method: Option<String>, handler: Handler) -> &mut Self {
        self.layers.push(RouteLayer { method, handler });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        name: &'static str,
        flow: Flow,
    ) -> impl for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync + 'static
    {
        let log = log.clone();
        move |req| {
            log.lock().unwrap().push(format!("{}:{}", name, req.method));
            Box::pin(async move { Ok(flow) })
        }
    }

    #[tokio::test]
    async fn test_method_scoping() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new("/users/:user");
        route
            .invite(recorder(&log, "invite", Flow::Next))
            .bye(recorder(&log, "bye", Flow::Next))
            .all(recorder(&log, "all", Flow::Next));

        assert!(route.handles_method("invite"));
        assert!(route.handles_method("message"));
        assert_eq!(route.methods(), None);

        let mut req = Request::new("invite", "/users/alice");
        assert_eq!(route.dispatch(&mut req).await.unwrap(), Flow::Next);
        assert_eq!(*log.lock().unwrap(), vec!["invite:invite", "all:invite"]);
    }

    #[tokio::test]
    async fn test_done_stops_route() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new("/");
        route
            .all(recorder(&log, "first", Flow::Done))
            .all(recorder(&log, "second", Flow::Next));

        let mut req = Request::new("info", "/");
        assert_eq!(route.dispatch(&mut req).await.unwrap(), Flow::Done);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_verb_helpers() {
        let mut route = Route::new("/rooms/:room");
        route
            .invite(|_req| Box::pin(async { Ok(Flow::Next) }))
            .bye(|_req| Box::pin(async { Ok(Flow::Next) }))
            .method("INVITE", |_req| Box::pin(async { Ok(Flow::Next) }));

        assert_eq!(route.methods(), Some(vec!["invite", "bye"]));
        assert!(!route.handles_method("message"));
        assert_eq!(route.path(), "/rooms/:room");
    }

    #[test]
    fn test_verb_helpers_cover_methods() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new("/");
        route
            .register(recorder(&log, "register", Flow::Next))
            .invite(recorder(&log, "invite", Flow::Next))
            .ack(recorder(&log, "ack", Flow::Next))
            .bye(recorder(&log, "bye", Flow::Next))
            .cancel(recorder(&log, "cancel", Flow::Next))
            .message(recorder(&log, "message", Flow::Next))
            .info(recorder(&log, "info", Flow::Next))
            .options(recorder(&log, "options", Flow::Next))
            .subscribe(recorder(&log, "subscribe", Flow::Next))
            .notify(recorder(&log, "notify", Flow::Next))
            .publish(recorder(&log, "publish", Flow::Next))
            .refer(recorder(&log, "refer", Flow::Next))
            .update(recorder(&log, "update", Flow::Next));

        assert_eq!(route.methods(), Some(METHODS.to_vec()));
    }
}
