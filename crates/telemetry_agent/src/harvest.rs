//! Harvest buffers keyed by endpoint.
//!
//! Several features can feed the same harvest endpoint, so buffers are
//! owned here rather than by the features. Each endpoint gets one
//! [`EventBuffer`] holding JSON events, created on first use.

use crate::error::AgentError;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use telemetry_event_system::{get_payload, ChunkedPayload, EventBuffer, HarvestPayload};
use tracing::debug;

/// Well-known harvest endpoints.
pub mod endpoints {
    pub const RUM: &str = "rum";
    pub const EVENTS: &str = "events";
    pub const JSERRORS: &str = "jserrors";
    pub const INS: &str = "ins";
    pub const LOGS: &str = "browser/logs";
    pub const BLOBS: &str = "browser/blobs";
}

pub type SharedBuffer = Arc<Mutex<EventBuffer<Value>>>;

/// Endpoint buffers shared by every feature of one agent.
///
/// Cloning yields another handle to the same set of buffers.
#[derive(Clone)]
pub struct HarvestBuffers {
    buffers: Arc<DashMap<String, SharedBuffer>>,
    max_payload_size: usize,
}

impl std::fmt::Debug for HarvestBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestBuffers")
            .field("endpoints", &self.buffers.len())
            .field("max_payload_size", &self.max_payload_size)
            .finish()
    }
}

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, EventBuffer<Value>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HarvestBuffers {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            buffers: Arc::new(DashMap::new()),
            max_payload_size,
        }
    }

    /// The buffer for `endpoint`, created empty on first use.
    pub fn buffer_for(&self, endpoint: &str) -> SharedBuffer {
        let entry = self.buffers.entry(endpoint.to_string()).or_insert_with(|| {
            debug!("🪣 Created harvest buffer for '{}'", endpoint);
            Arc::new(Mutex::new(EventBuffer::new(self.max_payload_size)))
        });
        Arc::clone(entry.value())
    }

    /// Adds `event` to the endpoint's buffer. `false` if the cap rejected it.
    pub fn add(&self, endpoint: &str, event: Value) -> bool {
        lock(&self.buffer_for(endpoint)).add(event)
    }

    /// Takes the endpoint's pending events, see [`EventBuffer::make_harvest_payload`].
    pub fn make_harvest_payload(&self, endpoint: &str, should_retry: bool) -> Option<HarvestPayload<Value>> {
        let buffer = Arc::clone(self.buffers.get(endpoint)?.value());
        let payload = lock(&buffer).make_harvest_payload(should_retry);
        payload
    }

    /// Reports the outcome of a harvest of `endpoint`.
    pub fn post_harvest_cleanup(&self, endpoint: &str, harvest_failed: bool) {
        if let Some(buffer) = self.buffers.get(endpoint).map(|b| Arc::clone(b.value())) {
            lock(&buffer).post_harvest_cleanup(harvest_failed);
        }
    }

    /// Takes the endpoint's events and splits them into sendable chunks.
    ///
    /// Buffers with a serializer produce a single value and cannot be
    /// chunked; their payload is wrapped as a one-event batch.
    pub fn make_chunked_payload(
        &self,
        endpoint: &str,
        should_retry: bool,
    ) -> Result<Option<ChunkedPayload<Value>>, AgentError> {
        let events = match self.make_harvest_payload(endpoint, should_retry) {
            None => return Ok(None),
            Some(HarvestPayload::Events(events)) => events,
            Some(HarvestPayload::Serialized(value)) => vec![value],
        };
        Ok(Some(get_payload(&events, self.max_payload_size)?))
    }

    /// Endpoints that currently hold events.
    pub fn pending_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .buffers
            .iter()
            .filter(|entry| !lock(entry.value()).is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    /// Events rejected by the size cap across all endpoints.
    pub fn rejected_total(&self) -> u64 {
        self.buffers.iter().map(|entry| lock(entry.value()).rejected()).sum()
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}
