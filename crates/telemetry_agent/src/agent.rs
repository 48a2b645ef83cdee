//! The agent: one emitter scope, its features and its harvest buffers.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::feature::{Feature, FeatureContext};
use crate::harvest::HarvestBuffers;
use futures::future::join_all;
use std::sync::Arc;
use telemetry_event_system::{
    EventArgs, EventContext, EventEmitter, EventRuntime, HandlerCache, Listener,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Generates a 16 hex character agent id.
pub fn generate_agent_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// A running agent.
///
/// Instrumentation reports through [`Agent::handle`] from the moment the
/// agent exists; features load later through [`Agent::load_features`].
#[derive(Debug)]
pub struct Agent {
    id: String,
    config: AgentConfig,
    runtime: Arc<EventRuntime>,
    scope: Arc<EventEmitter>,
    harvest: HarvestBuffers,
}

impl Agent {
    /// Creates an agent with a fresh id and a runtime of its own.
    pub fn new(config: AgentConfig) -> Arc<Self> {
        let runtime = Arc::new(EventRuntime::new(config.feature_priority()));
        Self::with_runtime(&generate_agent_id(), config, runtime)
    }

    /// Creates an agent under an existing runtime, so several agents share
    /// one emitter tree and handler registry.
    pub fn with_runtime(agent_id: &str, config: AgentConfig, runtime: Arc<EventRuntime>) -> Arc<Self> {
        let scope = runtime.agent_scope(agent_id, config.runtime.isolated_backlog);
        let harvest = HarvestBuffers::new(config.harvest.max_payload_size);
        info!(
            "🚀 Agent '{}' started (isolated backlog: {})",
            agent_id, config.runtime.isolated_backlog
        );
        Arc::new(Self {
            id: agent_id.to_string(),
            config,
            runtime,
            scope,
            harvest,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<EventRuntime> {
        &self.runtime
    }

    pub fn scope(&self) -> &Arc<EventEmitter> {
        &self.scope
    }

    pub fn harvest(&self) -> &HarvestBuffers {
        &self.harvest
    }

    /// Reports an event from instrumentation. See [`telemetry_event_system::handle`].
    pub fn handle(
        &self,
        event_type: &str,
        args: EventArgs,
        ctx: Option<Arc<EventContext>>,
        group: Option<&str>,
    ) -> Option<Arc<EventContext>> {
        self.runtime
            .handle(event_type, args.shared(), ctx, group, Some(&self.scope))
    }

    /// Registers a handler on the agent scope outside of any feature.
    pub fn register_handler(&self, event_type: &str, handler: Listener, group: Option<&str>) {
        self.runtime
            .register_handler(event_type, handler, group, Some(&self.scope));
    }

    /// Signals that `group` is ready. See [`telemetry_event_system::DrainCoordinator::drain`].
    pub fn drain(&self, group: &str, force: bool) -> Result<(), AgentError> {
        Ok(self.runtime.drain(&self.id, group, force)?)
    }

    /// A decision cache using the configured timeout.
    pub fn decision_cache(&self) -> HandlerCache {
        HandlerCache::with_timeout(self.config.decision_timeout())
    }

    /// Loads `features` concurrently and waits for all of them.
    ///
    /// Every feature's group is registered with the drain gate before any
    /// load starts, so the groups flush together in priority order once the
    /// last one is ready. Results come back in the order of `features`.
    pub async fn load_features(&self, features: Vec<Arc<dyn Feature>>) -> Vec<Result<(), AgentError>> {
        for feature in &features {
            if let Err(e) = self.runtime.register_drain(&self.id, feature.name()) {
                error!("❌ Could not register drain for '{}': {}", feature.name(), e);
            }
        }

        let handles: Vec<_> = features
            .iter()
            .map(|feature| (feature.name().to_string(), self.spawn_load(feature.clone())))
            .collect();

        let names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
        let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        names
            .iter()
            .zip(results)
            .map(|(name, joined)| match joined {
                Ok(result) => result,
                Err(e) => Err(AgentError::feature_load(name, e)),
            })
            .collect()
    }

    /// Registers and loads a single feature in the background.
    pub fn load_feature(&self, feature: Arc<dyn Feature>) -> Result<JoinHandle<Result<(), AgentError>>, AgentError> {
        self.runtime.register_drain(&self.id, feature.name())?;
        Ok(self.spawn_load(feature))
    }

    fn spawn_load(&self, feature: Arc<dyn Feature>) -> JoinHandle<Result<(), AgentError>> {
        let runtime = self.runtime.clone();
        let ctx = FeatureContext::new(
            &self.id,
            feature.name(),
            runtime.clone(),
            self.scope.clone(),
            self.harvest.clone(),
        );
        let agent_id = self.id.clone();

        tokio::spawn(async move {
            let group = feature.name().to_string();
            debug!("📦 Loading feature '{}' for agent '{}'", group, agent_id);
            let result = runtime
                .drains()
                .drain_when_ready(&agent_id, &group, feature.load(&ctx))
                .await;
            match &result {
                Ok(()) => info!("✅ Feature '{}' loaded", group),
                Err(e) => error!("❌ Feature '{}' failed: {}", group, e),
            }
            result
        })
    }

    /// Permanently stops the agent's scope. Buffered events are discarded.
    pub fn abort(&self) {
        info!("🛑 Aborting agent '{}'", self.id);
        self.scope.abort();
    }
}
