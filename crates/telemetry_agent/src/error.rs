//! Error types for the telemetry agent.

use telemetry_event_system::{DrainError, HarvestError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Drain error: {0}")]
    Drain(#[from] DrainError),

    #[error("Harvest error: {0}")]
    Harvest(#[from] HarvestError),

    #[error("Feature '{feature}' failed to load: {reason}")]
    FeatureLoad { feature: String, reason: String },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already exists: {0}")]
    AgentAlreadyExists(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn feature_load(feature: &str, reason: impl std::fmt::Display) -> Self {
        Self::FeatureLoad {
            feature: feature.to_string(),
            reason: reason.to_string(),
        }
    }
}
