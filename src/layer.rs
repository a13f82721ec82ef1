//! Layers: the units the dispatch loop walks
//!
//! A layer binds a compiled path pattern to one of: a plain middleware,
//! an error-aware middleware, a route, or a mounted sub-router. Which kind
//! a layer is follows from the registration call that created it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use crate::error::RouteError;
use crate::path::{MatchOptions, PathMatch, PathPattern};
use crate::request::Request;
use crate::route::Route;
use crate::router::Router;
use crate::types::Flow;

/// What a handler hands back to the dispatch loop
pub type HandlerResult = Result<Flow, RouteError>;

/// Plain handler: `(req) -> Next | Done | Err`
pub type Handler =
    Arc<dyn for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync>;

/// Error-aware handler: `Ok(Next)` resolves the error, `Err` re-raises it
pub type ErrorHandler = Arc<
    dyn for<'r> Fn(RouteError, &'r mut Request) -> BoxFuture<'r, HandlerResult> + Send + Sync,
>;

/// Parameter middleware, called with the raw captured value
pub type ParamHandler = Arc<
    dyn for<'r> Fn(&'r mut Request, String) -> BoxFuture<'r, Result<(), RouteError>>
        + Send
        + Sync,
>;

pub(crate) enum LayerKind {
    Middleware(Handler),
    ErrorMiddleware(ErrorHandler),
    Route(Route),
    Router(Box<Router>),
}

pub(crate) struct Layer {
    pattern: PathPattern,
    /// Exact-match layers (routes) versus prefix layers (middleware, mounts)
    end: bool,
    pub(crate) kind: LayerKind,
}

impl Layer {
    pub(crate) fn middleware(path: &str, handler: Handler) -> Self {
        Self::prefix(path, LayerKind::Middleware(handler))
    }

    pub(crate) fn error_middleware(path: &str, handler: ErrorHandler) -> Self {
        Self::prefix(path, LayerKind::ErrorMiddleware(handler))
    }

    pub(crate) fn router(path: &str, router: Router) -> Self {
        Self::prefix(path, LayerKind::Router(Box::new(router)))
    }

    pub(crate) fn route(route: Route) -> Self {
        Self {
            pattern: route.pattern().clone(),
            end: true,
            kind: LayerKind::Route(route),
        }
    }

    fn prefix(path: &str, kind: LayerKind) -> Self {
        Self {
            pattern: PathPattern::parse(path),
            end: false,
            kind,
        }
    }

    pub(crate) fn is_error_aware(&self) -> bool {
        matches!(self.kind, LayerKind::ErrorMiddleware(_))
    }

    pub(crate) fn matches(&self, path: &str, strict: bool, case_sensitive: bool) -> Option<PathMatch> {
        let options = if self.end {
            MatchOptions::exact(strict, case_sensitive)
        } else {
            MatchOptions::prefix(case_sensitive)
        };
        self.pattern.matches(path, options)
    }

    pub(crate) fn path(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Call a handler and run its future, converting a panic into a `RouteError`
///
/// Covers both the synchronous body of the handler (before it returns its
/// future) and the future itself.
pub(crate) fn guarded<'a, T, F>(call: F) -> BoxFuture<'a, Result<T, RouteError>>
where
    T: Send + 'a,
    F: FnOnce() -> BoxFuture<'a, Result<T, RouteError>>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(result) => result,
                Err(payload) => Err(RouteError::Panic(panic_message(payload.as_ref()))),
            })
            .boxed(),
        Err(payload) => {
            let err = RouteError::Panic(panic_message(payload.as_ref()));
            future::ready(Err(err)).boxed()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
