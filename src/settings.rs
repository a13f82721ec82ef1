//! Application settings store
//!
//! Key/value options consulted by the dispatch loop on every pass.
//! Values are JSON values so that booleans, strings and numbers can share
//! one map.

use std::collections::HashMap;

use serde_json::Value;

/// Enables trailing-slash strictness for exact routes
pub const STRICT_ROUTING: &str = "strict routing";

/// Enables case-sensitive path matching (on by default)
pub const CASE_SENSITIVE_ROUTING: &str = "case sensitive routing";

/// Deployment environment name
pub const ENV: &str = "env";

/// Environment name that suppresses diagnostic detail
pub const PRODUCTION: &str = "production";

/// Settings store
///
/// Mutated while the application is configured, then frozen inside
/// the `Application`.
#[derive(Debug, Clone)]
pub struct Settings {
    values: HashMap<String, Value>,
}

impl Settings {
    /// Create a settings store with the default options
    pub fn new() -> Self {
        let mut settings = Self {
            values: HashMap::new(),
        };
        settings
            .set(ENV, "development")
            .enable(CASE_SENSITIVE_ROUTING)
            .disable(STRICT_ROUTING);
        settings
    }

    /// Assign a value to an option
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Get the value of an option
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get the value of an option if it is a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Set a boolean option to true
    pub fn enable(&mut self, name: impl Into<String>) -> &mut Self {
        self.set(name, true)
    }

    /// Set a boolean option to false
    pub fn disable(&mut self, name: impl Into<String>) -> &mut Self {
        self.set(name, false)
    }

    /// Check whether an option holds a truthy value
    pub fn enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(truthy)
    }

    /// Check whether an option is unset or holds a falsy value
    pub fn disabled(&self, name: &str) -> bool {
        !self.enabled(name)
    }

    /// Check whether `env` is set to production
    pub fn is_production(&self) -> bool {
        self.get_str(ENV) == Some(PRODUCTION)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
