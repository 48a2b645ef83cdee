//! # Handler registry
//!
//! Aggregators register their handlers here, keyed by `(group, event type)`,
//! before the group's backlog has drained. Registration alone never delivers
//! anything: buffered events are replayed by the
//! [`DrainCoordinator`](crate::drain::DrainCoordinator), which then attaches
//! each registration as a live listener on its target emitter.
//!
//! Registrations are stored outside the emitters so that a handler can target
//! any scope, and so that several agents can share one registry. Replay only
//! delivers a buffered record to registrations whose target is the emitter
//! that produced the record.

use crate::emitter::{Backlog, EventEmitter, EventRecord, Listener};
use crate::events::{EventType, GroupName, DEFAULT_GROUP};
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A handler waiting for its group to drain.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub event_type: EventType,
    pub target: Arc<EventEmitter>,
    pub handler: Listener,
}

impl HandlerRegistration {
    /// True when `record` should be replayed to this registration.
    pub fn accepts(&self, record: &EventRecord) -> bool {
        self.event_type == record.event_type && record.is_from(&self.target)
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("event_type", &self.event_type)
            .field("target", &self.target.debug_id())
            .finish()
    }
}

/// Maps `(group, event type)` to pending handler registrations.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    /// Registrations per group, in registration order.
    groups: Mutex<HashMap<GroupName, Vec<HandlerRegistration>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupName, Vec<HandlerRegistration>>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `handler` for `event_type` in `group` (`"feature"` when `None`).
    ///
    /// When the target's backlog has already drained `group`, there is nothing
    /// left to replay and no drain will come to attach the handler, so it is
    /// subscribed directly and only sees future live events.
    pub fn register_handler(
        &self,
        event_type: &str,
        handler: Listener,
        group: Option<&str>,
        target: &Arc<EventEmitter>,
    ) {
        let group = group.unwrap_or(DEFAULT_GROUP);
        if target.backlog().is_drained(group) {
            debug!(
                "🔗 Group '{}' already drained; '{}' handler attached live without replay",
                group, event_type
            );
            target.on(event_type, handler);
            return;
        }

        self.lock()
            .entry(CompactString::new(group))
            .or_default()
            .push(HandlerRegistration {
                event_type: CompactString::new(event_type),
                target: target.clone(),
                handler,
            });
        debug!("📝 Registered '{}' handler in group '{}'", event_type, group);
    }

    /// Removes and returns the registrations in `group` whose target buffers
    /// into `backlog`. Registrations belonging to other agents are kept.
    pub fn take_scope(&self, group: &str, backlog: &Arc<Backlog>) -> Vec<HandlerRegistration> {
        let mut groups = self.lock();
        let Some(registrations) = groups.get_mut(group) else {
            return Vec::new();
        };
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(registrations)
            .into_iter()
            .partition(|r| Arc::ptr_eq(r.target.backlog(), backlog));
        if kept.is_empty() {
            groups.remove(group);
        } else {
            *registrations = kept;
        }
        taken
    }

    /// Number of registrations pending in `group`.
    pub fn pending(&self, group: &str) -> usize {
        self.lock().get(group).map_or(0, Vec::len)
    }
}
