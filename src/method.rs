//! Signaling method helpers
//!
//! Generates one registration method per well-known signaling verb on
//! `Router` and `Route`. Other verbs go through `method(..)` directly.

/// Well-known signaling methods, lowercased
pub const METHODS: &[&str] = &[
    "register",
    "invite",
    "ack",
    "bye",
    "cancel",
    "message",
    "info",
    "options",
    "subscribe",
    "notify",
    "publish",
    "refer",
    "update",
];

macro_rules! route_verbs {
    ($($verb:ident),* $(,)?) => {
        $(
            #[doc = concat!("Append a handler for `", stringify!($verb), "` requests")]
            pub fn $verb<F>(&mut self, handler: F) -> &mut Self
            where
                F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult>
                    + Send
                    + Sync
                    + 'static,
            {
                self.method(stringify!($verb), handler)
            }
        )*
    };
}

macro_rules! router_verbs {
    ($($verb:ident),* $(,)?) => {
        $(
            #[doc = concat!("Register a handler for `", stringify!($verb), "` requests on an exact path")]
            pub fn $verb<F>(&mut self, path: &str, handler: F) -> &mut Self
            where
                F: for<'r> Fn(&'r mut Request) -> BoxFuture<'r, HandlerResult>
                    + Send
                    + Sync
                    + 'static,
            {
                self.method(stringify!($verb), path, handler)
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods_lowercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for method in METHODS {
            assert_eq!(*method, method.to_lowercase());
            assert!(seen.insert(*method));
        }
    }
}
