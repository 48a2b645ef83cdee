/// Core EventEmitter implementation
use crate::events::{
    context_key, ContextCarrier, EventArgs, EventContext, EventType, GroupName, DEFAULT_GROUP,
};
use super::backlog::{Backlog, EventRecord};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

/// Callback invoked for an emitted event.
///
/// Receives the correlation context and the payload. Listeners are compared
/// by `Arc` identity when removed.
pub type Listener = Arc<dyn Fn(&Arc<EventContext>, &Arc<EventArgs>) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Arc<EventContext>, &Arc<EventArgs>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Flags controlling a single emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Deliver even when the emitter has been aborted.
    pub force: bool,
    /// Re-emit on the parent scope after local dispatch.
    pub bubble: bool,
}

#[derive(Default)]
struct EmitterState {
    listeners: HashMap<EventType, SmallVec<[Listener; 4]>>,
    /// Event type → group it buffers under.
    buffer_groups: HashMap<EventType, GroupName>,
    children: HashMap<CompactString, Arc<EventEmitter>>,
}

/// A scoped publish/subscribe node.
///
/// Emitters form a tree: the root is created once per process and every
/// agent, and every instrumentation module inside an agent, gets a child
/// scope through [`EventEmitter::get`]. Children share their parent's
/// [`Backlog`] unless created with [`EventEmitter::get_isolated`].
///
/// Event types that are *buffering* are not dispatched on emit; they are
/// queued in the backlog until the drain coordinator replays them. All other
/// types go straight to the registered listeners, synchronously and in
/// subscription order. No lock is held while a listener runs, so listeners
/// are free to emit, subscribe or buffer from inside a callback.
pub struct EventEmitter {
    debug_id: Option<CompactString>,
    parent: Weak<EventEmitter>,
    backlog: Arc<Backlog>,
    isolated_backlog: bool,
    aborted: AtomicBool,
    state: Mutex<EmitterState>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("debug_id", &self.debug_id)
            .field("isolated_backlog", &self.isolated_backlog)
            .field("aborted", &self.aborted())
            .field("backlog_groups", &self.backlog.group_count())
            .finish()
    }
}

impl EventEmitter {
    /// Creates a root emitter with its own backlog.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            debug_id: None,
            parent: Weak::new(),
            backlog: Arc::new(Backlog::new()),
            isolated_backlog: false,
            aborted: AtomicBool::new(false),
            state: Mutex::new(EmitterState::default()),
        })
    }

    fn new_child(parent: &Arc<Self>, id: &str, isolated: bool) -> Arc<Self> {
        let backlog = if isolated {
            Arc::new(Backlog::new())
        } else {
            parent.backlog.clone()
        };
        Arc::new(Self {
            debug_id: Some(CompactString::new(id)),
            parent: Arc::downgrade(parent),
            backlog,
            isolated_backlog: isolated,
            aborted: AtomicBool::new(false),
            state: Mutex::new(EmitterState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the child scope for `id`, creating it on first use.
    ///
    /// The child shares this emitter's backlog. Calling `get` twice with the
    /// same id returns the same node.
    pub fn get(self: &Arc<Self>, id: &str) -> Arc<Self> {
        self.get_or_create(id, false)
    }

    /// Like [`get`](Self::get), but a newly created child gets its own backlog.
    ///
    /// If the child already exists it is returned unchanged.
    pub fn get_isolated(self: &Arc<Self>, id: &str) -> Arc<Self> {
        self.get_or_create(id, true)
    }

    /// Returns the child scope for `id` if it was already created.
    pub fn child(&self, id: &str) -> Option<Arc<Self>> {
        self.state().children.get(id).cloned()
    }

    fn get_or_create(self: &Arc<Self>, id: &str, isolated: bool) -> Arc<Self> {
        let mut state = self.state();
        if let Some(existing) = state.children.get(id) {
            return existing.clone();
        }
        let child = Self::new_child(self, id, isolated);
        state.children.insert(CompactString::new(id), child.clone());
        debug!("🌱 Created emitter scope '{}' (isolated backlog: {})", id, isolated);
        child
    }

    /// Identifier this scope was created with (`None` for the root).
    pub fn debug_id(&self) -> Option<&str> {
        self.debug_id.as_deref()
    }

    /// Parent scope, if this is not the root and the parent is still alive.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// The backlog this scope buffers into.
    pub fn backlog(&self) -> &Arc<Backlog> {
        &self.backlog
    }

    pub fn has_isolated_backlog(&self) -> bool {
        self.isolated_backlog
    }

    /// True when this scope or any ancestor has been aborted.
    pub fn aborted(&self) -> bool {
        if self.aborted.load(Ordering::Acquire) {
            return true;
        }
        self.parent.upgrade().map_or(false, |parent| parent.aborted())
    }

    /// Permanently stops this scope.
    ///
    /// Every backlog group is removed in place: the backlog object itself is
    /// kept, so anyone holding it observes the emptied state.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.backlog.clear();
        debug!("🛑 Emitter scope '{}' aborted", self.debug_id().unwrap_or("root"));
    }

    /// Subscribes `cb` to `event_type`.
    pub fn on(&self, event_type: &str, cb: Listener) {
        self.state()
            .listeners
            .entry(CompactString::new(event_type))
            .or_default()
            .push(cb);
    }

    /// Removes every subscription of `cb` (by identity) from `event_type`.
    pub fn remove_event_listener(&self, event_type: &str, cb: &Listener) {
        if let Some(list) = self.state().listeners.get_mut(event_type) {
            list.retain(|existing| !Arc::ptr_eq(existing, cb));
        }
    }

    /// Snapshot of the listeners for `event_type`, in subscription order.
    pub fn listeners(&self, event_type: &str) -> SmallVec<[Listener; 4]> {
        self.state()
            .listeners
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Marks `types` as buffering under `group` (`"feature"` when `None`).
    ///
    /// Types already buffering are left alone, and an aborted scope never
    /// starts buffering. A group that has already drained stays drained.
    pub fn buffer(&self, types: &[&str], group: Option<&str>) {
        if self.aborted() {
            return;
        }
        let group = group.unwrap_or(DEFAULT_GROUP);
        for event_type in types {
            if self.is_buffering(event_type) {
                continue;
            }
            self.backlog.ensure_group(group);
            self.state()
                .buffer_groups
                .insert(CompactString::new(*event_type), CompactString::new(group));
            trace!("📥 Buffering '{}' under group '{}'", event_type, group);
        }
    }

    /// True when emissions of `event_type` are currently queued instead of dispatched.
    pub fn is_buffering(&self, event_type: &str) -> bool {
        self.buffer_group(event_type)
            .map_or(false, |group| self.backlog.is_buffering(&group))
    }

    fn buffer_group(&self, event_type: &str) -> Option<GroupName> {
        self.state().buffer_groups.get(event_type).cloned()
    }

    /// Returns the correlation context for `carrier`.
    ///
    /// A carrier that already holds a context under the reserved key gets the
    /// same context back; otherwise a new one is minted and attached. Without
    /// a carrier a fresh, unattached context is returned.
    pub fn context(&self, carrier: Option<&ContextCarrier>) -> Arc<EventContext> {
        let key = context_key();
        match carrier {
            Some(carrier) => carrier.get_or_insert_with(key, || Arc::new(EventContext::new(key))),
            None => Arc::new(EventContext::new(key)),
        }
    }

    /// Emits `event_type` with default options (no force, no bubbling).
    pub fn emit(
        self: &Arc<Self>,
        event_type: &str,
        args: Arc<EventArgs>,
        ctx: Option<Arc<EventContext>>,
    ) -> Option<Arc<EventContext>> {
        self.emit_with(event_type, args, ctx, EmitOptions::default())
    }

    /// Emits `event_type`.
    ///
    /// Returns the context the event was emitted with, or `None` when the
    /// scope is aborted and the emission was not forced.
    pub fn emit_with(
        self: &Arc<Self>,
        event_type: &str,
        args: Arc<EventArgs>,
        ctx: Option<Arc<EventContext>>,
        options: EmitOptions,
    ) -> Option<Arc<EventContext>> {
        if self.aborted() && !options.force {
            return None;
        }
        let ctx = ctx.unwrap_or_else(|| self.context(None));

        if let Some(group) = self.buffer_group(event_type) {
            let record = EventRecord {
                source: Arc::downgrade(self),
                event_type: CompactString::new(event_type),
                args: args.clone(),
                context: ctx.clone(),
            };
            if self.backlog.push(&group, record) {
                trace!("📦 Buffered '{}' in group '{}'", event_type, group);
                return Some(ctx);
            }
        }

        for cb in self.listeners(event_type).iter() {
            cb(&ctx, &args);
        }

        if options.bubble {
            if let Some(parent) = self.parent.upgrade() {
                parent.emit_with(
                    event_type,
                    args,
                    Some(ctx.clone()),
                    EmitOptions { force: false, bubble: true },
                );
            }
        }

        Some(ctx)
    }
}
