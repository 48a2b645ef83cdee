//! # Drain coordination
//!
//! Each agent registers the groups (features) it expects to load. Every
//! group buffers its events until its aggregator signals readiness with
//! [`DrainCoordinator::drain`]. Once *every* registered group of an agent has
//! signalled, all of them are flushed together in [`FeaturePriority`] order,
//! regardless of the order in which the loads finished. Groups that were never
//! registered drain immediately and on their own.
//!
//! Flushing a group attaches its handler registrations as live listeners,
//! then replays the backlog to them. The group flips to drained under the
//! backlog lock once the last record has been replayed, so an emission racing
//! the flush is either replayed or dispatched live, never dropped.

mod priority;
mod tests;

pub use self::priority::{features, FeaturePriority};

use crate::emitter::EventEmitter;
use crate::error::DrainError;
use crate::events::{EventArgs, GroupName};
use crate::registry::HandlerRegistry;
use compact_str::CompactString;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct DrainEntry {
    group: GroupName,
    staged: bool,
    priority: i32,
}

/// Priority-ordered readiness gate, one per agent id.
pub struct DrainCoordinator {
    root: Arc<EventEmitter>,
    handlers: Arc<HandlerRegistry>,
    priority: FeaturePriority,
    /// Pending groups per agent id, in registration order.
    pending: Mutex<HashMap<String, Vec<DrainEntry>>>,
}

impl std::fmt::Debug for DrainCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainCoordinator")
            .field("priority", &self.priority)
            .field("agents", &self.lock().len())
            .finish()
    }
}

impl DrainCoordinator {
    /// Creates a coordinator that resolves agent scopes under `root`.
    pub fn new(
        root: Arc<EventEmitter>,
        handlers: Arc<HandlerRegistry>,
        priority: FeaturePriority,
    ) -> Self {
        Self {
            root,
            handlers,
            priority,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<DrainEntry>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn priority(&self) -> &FeaturePriority {
        &self.priority
    }

    /// Adds `group` to the agent's gate. Registering twice is a no-op.
    pub fn register_drain(&self, agent_id: &str, group: &str) -> Result<(), DrainError> {
        require_agent(agent_id, group)?;
        let mut pending = self.lock();
        let entries = pending.entry(agent_id.to_string()).or_default();
        if !entries.iter().any(|e| e.group == group) {
            entries.push(DrainEntry {
                group: CompactString::new(group),
                staged: false,
                priority: self.priority.rank(group),
            });
            debug!("🚧 Agent '{}' waiting on group '{}'", agent_id, group);
        }
        Ok(())
    }

    /// Signals that `group` is ready.
    ///
    /// An unregistered group, or any group when `force` is set, is flushed on
    /// the spot. Otherwise the group is staged and, if that was the last one
    /// the agent was waiting for, every staged group is flushed in priority
    /// order.
    pub fn drain(&self, agent_id: &str, group: &str, force: bool) -> Result<(), DrainError> {
        require_agent(agent_id, group)?;
        let ready = {
            let mut pending = self.lock();
            let entries = pending.get_mut(agent_id);
            let index = entries
                .as_ref()
                .and_then(|entries| entries.iter().position(|e| e.group == group));
            match (entries, index) {
                (Some(entries), Some(index)) if force => {
                    entries.remove(index);
                    vec![CompactString::new(group)]
                }
                (Some(entries), Some(index)) => {
                    entries[index].staged = true;
                    take_ready(entries)
                }
                _ => vec![CompactString::new(group)],
            }
        };

        for group in ready {
            self.drain_group(agent_id, &group, true);
        }
        Ok(())
    }

    /// Removes `group` from the agent's gate without replaying it.
    ///
    /// Handler registrations for the group are discarded and its backlog is
    /// marked drained, so an abandoned feature can never hold the gate shut.
    /// If the remaining groups were all waiting on this one, they flush now.
    pub fn deregister_drain(&self, agent_id: &str, group: &str) -> Result<(), DrainError> {
        require_agent(agent_id, group)?;
        let ready = {
            let mut pending = self.lock();
            match pending.get_mut(agent_id) {
                Some(entries) => {
                    entries.retain(|e| e.group != group);
                    take_ready(entries)
                }
                None => Vec::new(),
            }
        };

        self.drain_group(agent_id, group, false);
        for group in ready {
            self.drain_group(agent_id, &group, true);
        }
        Ok(())
    }

    /// Waits for `readiness` and then drains `group`; deregisters it if
    /// readiness fails.
    ///
    /// This is the hook for asynchronously loaded aggregators: the group stays
    /// buffered for as long as the future is pending.
    pub async fn drain_when_ready<F, E>(
        &self,
        agent_id: &str,
        group: &str,
        readiness: F,
    ) -> Result<(), E>
    where
        F: Future<Output = Result<(), E>>,
        E: From<DrainError> + std::fmt::Display,
    {
        match readiness.await {
            Ok(()) => self.drain(agent_id, group, false).map_err(E::from),
            Err(e) => {
                warn!("⚠️ Group '{}' of agent '{}' failed to become ready: {}", group, agent_id, e);
                self.deregister_drain(agent_id, group).map_err(E::from)?;
                Err(e)
            }
        }
    }

    /// Number of agent ids that have registered at least one drain.
    pub fn agent_count(&self) -> usize {
        self.lock().len()
    }

    /// Groups the agent is still waiting on, in registration order.
    pub fn pending_groups(&self, agent_id: &str) -> Vec<GroupName> {
        self.lock()
            .get(agent_id)
            .map(|entries| entries.iter().map(|e| e.group.clone()).collect())
            .unwrap_or_default()
    }

    fn drain_group(&self, agent_id: &str, group: &str, activate: bool) {
        let Some(scope) = self.root.child(agent_id) else {
            debug!("⏭️ No scope for agent '{}'; nothing to drain in '{}'", agent_id, group);
            return;
        };
        if scope.aborted() {
            debug!("⏭️ Skipping drain of '{}' for aborted agent '{}'", group, agent_id);
            return;
        }
        let backlog = scope.backlog().clone();

        if activate {
            // Live listeners go in first. Until the backlog flips to drained,
            // emissions for the group are still buffered, so they only reach
            // these handlers through the replay below.
            let registrations = self.handlers.take_scope(group, &backlog);
            for registration in &registrations {
                registration
                    .target
                    .on(&registration.event_type, registration.handler.clone());
            }

            let mut replayed = 0usize;
            while let Some(record) = backlog.next_or_drain(group, replayed) {
                for registration in registrations.iter().filter(|r| r.accepts(&record)) {
                    (registration.handler)(&record.context, &record.args);
                }
                replayed += 1;
            }

            // Registered while the replay ran, before the group flipped.
            for registration in self.handlers.take_scope(group, &backlog) {
                registration
                    .target
                    .on(&registration.event_type, registration.handler);
            }
            debug!("🚰 Drained group '{}' for agent '{}' ({} events replayed)", group, agent_id, replayed);
        } else {
            let discarded = self.handlers.take_scope(group, &backlog);
            backlog.mark_drained(group);
            debug!(
                "🗑️ Deregistered group '{}' for agent '{}' ({} handlers discarded)",
                group,
                agent_id,
                discarded.len()
            );
        }

        scope.emit(&format!("drain-{group}"), EventArgs::Empty.shared(), None);
    }
}

fn require_agent(agent_id: &str, group: &str) -> Result<(), DrainError> {
    if agent_id.is_empty() {
        return Err(DrainError::MissingAgentIdentifier {
            group: group.to_string(),
        });
    }
    Ok(())
}

/// Empties `entries` and returns their groups in priority order once every
/// entry is staged; otherwise returns nothing.
fn take_ready(entries: &mut Vec<DrainEntry>) -> Vec<GroupName> {
    if entries.is_empty() || !entries.iter().all(|e| e.staged) {
        return Vec::new();
    }
    let mut ready = std::mem::take(entries);
    ready.sort_by_key(|e| e.priority);
    ready.into_iter().map(|e| e.group).collect()
}
