//! Feature interface.
//!
//! A feature is the aggregator half of an instrumentation area (errors,
//! ajax, page timings, ...). Its instrumentation starts emitting as soon as
//! the agent starts; the feature itself loads asynchronously, registers its
//! handlers, and the agent then drains the feature's group.

use crate::error::AgentError;
use crate::harvest::{HarvestBuffers, SharedBuffer};
use async_trait::async_trait;
use std::sync::Arc;
use telemetry_event_system::{EventEmitter, EventRuntime, GroupName, Listener};

/// An asynchronously loaded aggregator.
///
/// # Example
///
/// ```rust,no_run
/// use telemetry_agent::{AgentError, Feature, FeatureContext};
/// use telemetry_event_system::{features, listener};
///
/// struct ErrorFeature;
///
/// #[async_trait::async_trait]
/// impl Feature for ErrorFeature {
///     fn name(&self) -> &str { features::JSERRORS }
///
///     async fn load(&self, ctx: &FeatureContext) -> Result<(), AgentError> {
///         let buffer = ctx.buffer_for("jserrors");
///         ctx.register_handler("err", listener(move |_, args| {
///             if let Ok(value) = serde_json::to_value(args.as_ref()) {
///                 buffer.lock().unwrap().add(value);
///             }
///         }));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    /// Feature name, also used as its drain group.
    fn name(&self) -> &str;

    /// Loads the feature and registers its handlers through `ctx`.
    ///
    /// The feature's group stays buffered until this returns. An error
    /// deregisters the group so it cannot hold back the other features.
    async fn load(&self, ctx: &FeatureContext) -> Result<(), AgentError>;
}

/// What a loading feature can reach.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    agent_id: String,
    group: GroupName,
    runtime: Arc<EventRuntime>,
    scope: Arc<EventEmitter>,
    harvest: HarvestBuffers,
}

impl FeatureContext {
    pub(crate) fn new(
        agent_id: &str,
        group: &str,
        runtime: Arc<EventRuntime>,
        scope: Arc<EventEmitter>,
        harvest: HarvestBuffers,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            group: GroupName::new(group),
            runtime,
            scope,
            harvest,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Drain group handlers registered through this context belong to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The agent's emitter scope.
    pub fn scope(&self) -> &Arc<EventEmitter> {
        &self.scope
    }

    pub fn runtime(&self) -> &Arc<EventRuntime> {
        &self.runtime
    }

    pub fn harvest(&self) -> &HarvestBuffers {
        &self.harvest
    }

    pub fn buffer_for(&self, endpoint: &str) -> SharedBuffer {
        self.harvest.buffer_for(endpoint)
    }

    /// Registers `handler` for `event_type` in this feature's group on the
    /// agent scope.
    pub fn register_handler(&self, event_type: &str, handler: Listener) {
        self.register_handler_in(event_type, handler, &self.group);
    }

    /// Registers `handler` under another group, for features that consume
    /// events buffered by a different producer group (for example `"api"`).
    pub fn register_handler_in(&self, event_type: &str, handler: Listener, group: &str) {
        self.runtime
            .register_handler(event_type, handler, Some(group), Some(&self.scope));
    }
}
