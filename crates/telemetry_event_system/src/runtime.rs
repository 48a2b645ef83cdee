//! # Event runtime
//!
//! Bundles the pieces one process needs: the root emitter, the shared handler
//! registry and the drain coordinator. Agents live as child scopes of the
//! root, keyed by their agent id.

use crate::drain::{DrainCoordinator, FeaturePriority};
use crate::emitter::{EventEmitter, Listener};
use crate::error::DrainError;
use crate::events::{EventArgs, EventContext};
use crate::handle::{handle, HANDLE_SCOPE};
use crate::registry::HandlerRegistry;
use std::sync::Arc;
use tracing::info;

/// Root emitter, handler registry and drain gate for one process.
#[derive(Debug)]
pub struct EventRuntime {
    root: Arc<EventEmitter>,
    handlers: Arc<HandlerRegistry>,
    drains: DrainCoordinator,
}

impl EventRuntime {
    /// Creates a runtime whose drain gate flushes groups in `priority` order.
    pub fn new(priority: FeaturePriority) -> Self {
        let root = EventEmitter::root();
        let handlers = Arc::new(HandlerRegistry::new());
        let drains = DrainCoordinator::new(root.clone(), handlers.clone(), priority);
        info!("🔧 Event runtime created");
        Self {
            root,
            handlers,
            drains,
        }
    }

    pub fn root(&self) -> &Arc<EventEmitter> {
        &self.root
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn drains(&self) -> &DrainCoordinator {
        &self.drains
    }

    /// Emitter scope for `agent_id`, created on first use.
    ///
    /// With `isolated_backlog` a newly created scope buffers into its own
    /// backlog; an existing scope is returned as is.
    pub fn agent_scope(&self, agent_id: &str, isolated_backlog: bool) -> Arc<EventEmitter> {
        if isolated_backlog {
            self.root.get_isolated(agent_id)
        } else {
            self.root.get(agent_id)
        }
    }

    /// The shared scope producers fall back to when they name no emitter.
    pub fn handle_scope(&self) -> Arc<EventEmitter> {
        self.root.get(HANDLE_SCOPE)
    }

    /// [`handle`] against `target`, or the shared handle scope.
    pub fn handle(
        &self,
        event_type: &str,
        args: Arc<EventArgs>,
        ctx: Option<Arc<EventContext>>,
        group: Option<&str>,
        target: Option<&Arc<EventEmitter>>,
    ) -> Option<Arc<EventContext>> {
        match target {
            Some(target) => handle(event_type, args, ctx, group, target),
            None => handle(event_type, args, ctx, group, &self.handle_scope()),
        }
    }

    /// Registers a handler against `target`, or the shared handle scope.
    pub fn register_handler(
        &self,
        event_type: &str,
        handler: Listener,
        group: Option<&str>,
        target: Option<&Arc<EventEmitter>>,
    ) {
        match target {
            Some(target) => self.handlers.register_handler(event_type, handler, group, target),
            None => self
                .handlers
                .register_handler(event_type, handler, group, &self.handle_scope()),
        }
    }

    pub fn register_drain(&self, agent_id: &str, group: &str) -> Result<(), DrainError> {
        self.drains.register_drain(agent_id, group)
    }

    pub fn drain(&self, agent_id: &str, group: &str, force: bool) -> Result<(), DrainError> {
        self.drains.drain(agent_id, group, force)
    }

    pub fn deregister_drain(&self, agent_id: &str, group: &str) -> Result<(), DrainError> {
        self.drains.deregister_drain(agent_id, group)
    }
}

impl Default for EventRuntime {
    fn default() -> Self {
        Self::new(FeaturePriority::default())
    }
}
