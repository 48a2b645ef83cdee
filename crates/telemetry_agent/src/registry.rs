//! Process-wide agent registry.
//!
//! Agents register themselves by id so that code without a direct handle
//! (instrumentation wrappers, late-loading features) can find them.
//! Registration is explicit: nothing is created on lookup.

use crate::agent::Agent;
use crate::error::AgentError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, warn};

static GLOBAL_REGISTRY: Lazy<AgentRegistry> = Lazy::new(AgentRegistry::new);

/// Returns the process-wide registry.
pub fn global_registry() -> &'static AgentRegistry {
    &GLOBAL_REGISTRY
}

/// Agents keyed by id.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `agent` under its id. An id can only be taken once.
    pub fn init(&self, agent: Arc<Agent>) -> Result<Arc<Agent>, AgentError> {
        match self.agents.entry(agent.id().to_string()) {
            Entry::Occupied(_) => {
                warn!("⚠️ Agent '{}' is already registered", agent.id());
                Err(AgentError::AgentAlreadyExists(agent.id().to_string()))
            }
            Entry::Vacant(slot) => {
                debug!("📋 Registered agent '{}'", agent.id());
                slot.insert(agent.clone());
                Ok(agent)
            }
        }
    }

    pub fn lookup(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`lookup`](Self::lookup), but a missing agent is an error.
    pub fn require(&self, agent_id: &str) -> Result<Arc<Agent>, AgentError> {
        self.lookup(agent_id)
            .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))
    }

    pub fn remove(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.remove(agent_id).map(|(_, agent)| agent)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    #[test]
    fn test_init_lookup_remove() {
        let registry = AgentRegistry::new();
        let agent = Agent::new(AgentConfig::default());
        let id = agent.id().to_string();

        registry.init(agent.clone()).unwrap();
        assert!(Arc::ptr_eq(&registry.lookup(&id).unwrap(), &agent));
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(matches!(
            registry.init(agent.clone()),
            Err(AgentError::AgentAlreadyExists(_))
        ));

        assert!(registry.remove(&id).is_some());
        assert!(registry.lookup(&id).is_none());
        assert!(matches!(registry.require(&id), Err(AgentError::AgentNotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_global_registry_is_shared() {
        let agent = Agent::new(AgentConfig::default());
        global_registry().init(agent.clone()).unwrap();
        assert!(global_registry().lookup(agent.id()).is_some());
        global_registry().remove(agent.id());
    }
}
