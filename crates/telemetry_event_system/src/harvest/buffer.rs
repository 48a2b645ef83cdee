//! Per-endpoint event accumulation with a payload-size ceiling.
//!
//! An [`EventBuffer`] collects ready-to-send events for one harvest
//! destination. The harvest transport takes a payload out with
//! [`EventBuffer::make_harvest_payload`], sends it, and reports the outcome
//! through [`EventBuffer::post_harvest_cleanup`]. When a retry was requested,
//! the taken events are kept in a backup slot and restored ahead of anything
//! collected in the meantime, as long as the combined size stays under the
//! cap. Past the cap the older data is dropped.

use super::size::estimate_size;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Default ceiling on the estimated size of one buffer, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 1_000_000;

/// Converts a batch of events into the value handed to the transport.
pub type PayloadSerializer<T> = Box<dyn Fn(&[T]) -> Value + Send + Sync>;

/// What [`EventBuffer::make_harvest_payload`] hands to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestPayload<T> {
    /// The raw events, when the buffer has no serializer.
    Events(Vec<T>),
    /// The serializer's output.
    Serialized(Value),
}

#[derive(Debug)]
struct Backup<T> {
    events: Vec<T>,
    byte_size: usize,
}

/// Size-capped event list with a retry backup.
pub struct EventBuffer<T> {
    events: Vec<T>,
    byte_size: usize,
    max_payload_size: usize,
    backup: Option<Backup<T>>,
    serializer: Option<PayloadSerializer<T>>,
    rejected: u64,
}

impl<T: std::fmt::Debug> std::fmt::Debug for EventBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("len", &self.events.len())
            .field("byte_size", &self.byte_size)
            .field("max_payload_size", &self.max_payload_size)
            .field("has_backup", &self.backup.is_some())
            .field("rejected", &self.rejected)
            .finish()
    }
}

impl<T: Serialize + Clone> EventBuffer<T> {
    /// Creates an empty buffer capped at `max_payload_size` bytes.
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            events: Vec::new(),
            byte_size: 0,
            max_payload_size,
            backup: None,
            serializer: None,
            rejected: 0,
        }
    }

    /// Sets the function applied to the event list when a payload is made.
    pub fn with_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&[T]) -> Value + Send + Sync + 'static,
    {
        self.serializer = Some(Box::new(serializer));
        self
    }

    /// Appends `event` unless it would push the buffer past the cap.
    ///
    /// A rejected event leaves the buffer untouched; the caller decides
    /// whether to harvest early or drop it.
    pub fn add(&mut self, event: T) -> bool {
        let size = estimate_size(&event);
        if self.would_exceed_max_size(size) {
            self.rejected += 1;
            warn!(
                "⚠️ Event of ~{} bytes rejected; buffer holds {} of {} bytes",
                size, self.byte_size, self.max_payload_size
            );
            return false;
        }
        self.events.push(event);
        self.byte_size += size;
        true
    }

    /// Empties the buffer into a payload, or returns `None` if it is empty.
    ///
    /// With `should_retry` the events are also kept aside until
    /// [`post_harvest_cleanup`](Self::post_harvest_cleanup) learns the outcome.
    pub fn make_harvest_payload(&mut self, should_retry: bool) -> Option<HarvestPayload<T>> {
        if self.events.is_empty() {
            return None;
        }

        if should_retry {
            self.backup = Some(Backup {
                events: self.events.clone(),
                byte_size: self.byte_size,
            });
        }

        let events = std::mem::take(&mut self.events);
        self.byte_size = 0;

        Some(match &self.serializer {
            Some(serialize) => HarvestPayload::Serialized(serialize(&events)),
            None => HarvestPayload::Events(events),
        })
    }

    /// Settles the backup slot after a harvest attempt.
    ///
    /// On failure the backed-up events go back in front of anything added
    /// since, unless the combined size would pass the cap. The slot is
    /// always cleared.
    pub fn post_harvest_cleanup(&mut self, harvest_failed: bool) {
        let Some(backup) = self.backup.take() else {
            return;
        };
        if !harvest_failed {
            return;
        }

        if backup.byte_size + self.byte_size <= self.max_payload_size {
            debug!("🔁 Restoring {} events after failed harvest", backup.events.len());
            let mut restored = backup.events;
            restored.append(&mut self.events);
            self.events = restored;
            self.byte_size += backup.byte_size;
        } else {
            warn!(
                "🗑️ Dropping {} events from failed harvest; restoring would exceed {} bytes",
                backup.events.len(),
                self.max_payload_size
            );
        }
    }

    /// Moves every event of `other` into this buffer, in front when `prepend`.
    ///
    /// Returns `false` and leaves both buffers untouched if the result would
    /// pass the cap.
    pub fn merge(&mut self, other: &mut EventBuffer<T>, prepend: bool) -> bool {
        if self.would_exceed_max_size(other.byte_size) {
            return false;
        }
        let mut incoming = std::mem::take(&mut other.events);
        if prepend {
            incoming.append(&mut self.events);
            self.events = incoming;
        } else {
            self.events.append(&mut incoming);
        }
        self.byte_size += other.byte_size;
        other.byte_size = 0;
        true
    }

    /// True if adding `size` more bytes would pass the cap.
    pub fn would_exceed_max_size(&self, size: usize) -> bool {
        self.byte_size.saturating_add(size) > self.max_payload_size
    }

    pub fn get(&self) -> &[T] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.byte_size = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Running size estimate of the buffered events.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Number of events turned away by [`add`](Self::add) so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl<T: Serialize + Clone> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}
