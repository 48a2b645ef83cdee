/// Backlog storage shared between an emitter and the scopes that inherit it
use crate::events::{EventArgs, EventContext, EventType, GroupName};
use super::core::EventEmitter;
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// A buffered emission waiting for its group to drain.
///
/// The source emitter is held weakly: the backlog lives inside the emitter
/// family, and a strong reference back would keep the family alive forever.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub source: Weak<EventEmitter>,
    pub event_type: EventType,
    pub args: Arc<EventArgs>,
    pub context: Arc<EventContext>,
}

impl EventRecord {
    /// Returns true when the record was emitted by `emitter`.
    pub fn is_from(&self, emitter: &Arc<EventEmitter>) -> bool {
        std::ptr::eq(self.source.as_ptr(), Arc::as_ptr(emitter))
    }
}

/// Observable state of one backlog group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Nobody asked for this group to buffer.
    Absent,
    /// Actively buffering; holds the number of records queued.
    Buffering(usize),
    /// Drained. The group never buffers again.
    Drained,
}

/// Per-group buffered events.
///
/// `None` marks a drained group, `Some` an actively buffering one, and a
/// missing key a group that was never requested. The backlog is shared by
/// `Arc` so that clearing it on abort is visible to every holder.
#[derive(Debug, Default)]
pub struct Backlog {
    groups: Mutex<HashMap<GroupName, Option<Vec<EventRecord>>>>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupName, Option<Vec<EventRecord>>>> {
        // A poisoned backlog still holds valid records; keep serving them.
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts buffering `group` unless it was already requested or drained.
    pub fn ensure_group(&self, group: &str) {
        self.lock()
            .entry(CompactString::new(group))
            .or_insert_with(|| Some(Vec::new()));
    }

    /// Appends a record to `group`. Returns false when the group is not buffering.
    pub fn push(&self, group: &str, record: EventRecord) -> bool {
        match self.lock().get_mut(group) {
            Some(Some(records)) => {
                records.push(record);
                true
            }
            _ => false,
        }
    }

    /// Returns the record at `index` in `group`, or marks the group drained
    /// when `index` is past the last record.
    ///
    /// Replay walks the group with this accessor. Records pushed while the
    /// replay runs are picked up, and the switch to drained happens under the
    /// same lock as the final length check, so no push can slip in between.
    pub fn next_or_drain(&self, group: &str, index: usize) -> Option<EventRecord> {
        let mut groups = self.lock();
        let slot = groups.entry(CompactString::new(group)).or_insert(None);
        let next = slot.as_ref().and_then(|records| records.get(index).cloned());
        if next.is_none() {
            *slot = None;
        }
        next
    }

    /// Marks `group` as drained, dropping any records it still holds.
    pub fn mark_drained(&self, group: &str) {
        self.lock().insert(CompactString::new(group), None);
    }

    /// Returns the state of `group`.
    pub fn state(&self, group: &str) -> GroupState {
        match self.lock().get(group) {
            None => GroupState::Absent,
            Some(None) => GroupState::Drained,
            Some(Some(records)) => GroupState::Buffering(records.len()),
        }
    }

    pub fn is_buffering(&self, group: &str) -> bool {
        matches!(self.state(group), GroupState::Buffering(_))
    }

    pub fn is_drained(&self, group: &str) -> bool {
        self.state(group) == GroupState::Drained
    }

    /// Removes every group in place.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of groups that were ever requested (buffering or drained).
    pub fn group_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the payloads buffered in `group`, in push order.
    pub fn buffered_args(&self, group: &str) -> Vec<Arc<EventArgs>> {
        match self.lock().get(group) {
            Some(Some(records)) => records.iter().map(|r| r.args.clone()).collect(),
            _ => Vec::new(),
        }
    }
}
