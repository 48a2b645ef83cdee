//! Error types for the telemetry event system.
//!
//! Steady-state operation never fails: a rejected event is a `false` return
//! from [`EventBuffer::add`](crate::harvest::EventBuffer::add) and a timed-out
//! decision is silently discarded. The errors below cover wiring mistakes and
//! payload serialization only.

use thiserror::Error;

/// Errors raised by the drain coordinator.
#[derive(Debug, Error)]
pub enum DrainError {
    /// A drain was requested without an agent identifier. This is a module
    /// wiring bug, not a runtime condition.
    #[error("Agent identifier required to drain group '{group}'")]
    MissingAgentIdentifier { group: String },
}

/// Errors raised while building harvest payloads.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// A chunk could not be serialized.
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error for callers that touch several subsystems.
#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Drain error: {0}")]
    Drain(#[from] DrainError),

    #[error("Harvest error: {0}")]
    Harvest(#[from] HarvestError),
}
