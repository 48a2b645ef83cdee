//! # Event payloads and correlation contexts
//!
//! Every emission carries an [`EventArgs`] payload and an [`EventContext`].
//! Payloads are a tagged enum instead of an untyped argument list: each
//! instrumentation event type maps onto one variant, and listeners match on
//! the variant they expect. Payloads travel as `Arc<EventArgs>` so a buffered
//! event is replayed with the very same allocation it was emitted with.
//!
//! Contexts correlate related emissions (for example the start and end of a
//! single request). A context can be stashed on a [`ContextCarrier`] so that
//! later emissions about the same object pick up the same context.

use compact_str::CompactString;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Name of an event type (`"err"`, `"xhr"`, `"drain-feature"`, ...).
pub type EventType = CompactString;

/// Name of a buffering/drain group (`"feature"`, `"api"`, a feature name).
pub type GroupName = CompactString;

/// Group used when a caller does not name one.
pub const DEFAULT_GROUP: &str = "feature";

/// Reserved prefix of the property under which contexts are stored on carriers.
pub const CONTEXT_PREFIX: &str = "nr@context:";

/// Per-process context key, `nr@context:<random id>`.
static CONTEXT_KEY: Lazy<String> =
    Lazy::new(|| format!("{}{}", CONTEXT_PREFIX, uuid::Uuid::new_v4().simple()));

/// Returns the reserved property name used for contexts in this process.
pub fn context_key() -> &'static str {
    CONTEXT_KEY.as_str()
}

/// Typed payload of an emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventArgs {
    /// No payload (lifecycle signals such as `drain-<group>`).
    Empty,
    /// A named numeric measurement.
    Metric { name: String, value: f64 },
    /// An uncaught error or reported exception.
    Error {
        message: String,
        stack: Option<String>,
        timestamp: u64,
    },
    /// A completed network request.
    Ajax {
        method: String,
        url: String,
        status: u16,
        duration_ms: f64,
    },
    /// A page timing entry.
    Timing {
        name: String,
        value: f64,
        #[serde(default)]
        attributes: Map<String, Value>,
    },
    /// A named custom event with free-form attributes.
    Custom {
        name: String,
        #[serde(default)]
        attributes: Map<String, Value>,
    },
    /// Positional values for event types without a dedicated variant.
    Values { values: Vec<Value> },
}

impl EventArgs {
    /// Wraps the payload for emission.
    pub fn shared(self) -> Arc<EventArgs> {
        Arc::new(self)
    }
}

/// Correlation context passed to every listener alongside the payload.
///
/// Listeners may attach scratch data to the context so that a later emission
/// sharing the same context can read it back.
#[derive(Debug)]
pub struct EventContext {
    context_id: CompactString,
    data: Mutex<HashMap<String, Value>>,
}

impl EventContext {
    /// Creates a context tagged with the given context id.
    pub fn new(context_id: &str) -> Self {
        Self {
            context_id: CompactString::new(context_id),
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the id of the emitter family that minted this context.
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Stores a scratch value on the context.
    pub fn set(&self, key: &str, value: Value) {
        if let Ok(mut data) = self.data.lock() {
            data.insert(key.to_string(), value);
        }
    }

    /// Reads a scratch value previously stored on the context.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().ok()?.get(key).cloned()
    }
}

/// An object that correlation contexts can be attached to.
///
/// Stands in for the host object (request, timer, element) an instrumentation
/// module wants to correlate events about.
#[derive(Debug, Default)]
pub struct ContextCarrier {
    slots: Mutex<HashMap<String, Arc<EventContext>>>,
}

impl ContextCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<EventContext>> {
        self.slots.lock().ok()?.get(key).cloned()
    }

    /// Returns the context stored under `key`, storing `make()` first when absent.
    pub fn get_or_insert_with<F>(&self, key: &str, make: F) -> Arc<EventContext>
    where
        F: FnOnce() -> Arc<EventContext>,
    {
        match self.slots.lock() {
            Ok(mut slots) => slots.entry(key.to_string()).or_insert_with(make).clone(),
            Err(_) => make(),
        }
    }

    /// Returns true when a context is already attached under the reserved prefix.
    pub fn has_context(&self) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.keys().any(|k| k.starts_with(CONTEXT_PREFIX)))
            .unwrap_or(false)
    }
}
