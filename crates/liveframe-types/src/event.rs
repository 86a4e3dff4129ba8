//! Events routed to view handlers.
//!
//! An [`Event`] is a name plus optional structured parameters. The same
//! value type is used for events arriving from the client and for
//! self-events scheduled by server-side logic; only the router knows the
//! origin.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// A named event with optional JSON parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Event name used to look up the handler (e.g. `"tick"`).
    pub name: String,
    /// Structured parameters. `null` when the event carries none.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Create an event with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Value::Null,
        }
    }

    /// Create an event carrying the given parameters.
    pub fn with_params(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Look up a string parameter by key.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Look up an integer parameter by key.
    ///
    /// Accepts JSON numbers and numeric strings, since form inputs
    /// arrive from the browser as strings.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
