//! # Telemetry Agent
//!
//! Hosts the [`telemetry_event_system`] core for an instrumented process:
//! loads configuration, installs logging, creates agents and loads their
//! features.
//!
//! ## Startup
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Loads (or creates) agent.toml, sets up logging, registers the agent.
//!     let agent = telemetry_agent::init(Path::new("agent.toml")).await?;
//!
//!     // Instrumentation can report right away; nothing is lost while
//!     // features are still loading.
//!     agent.handle("err", telemetry_event_system::EventArgs::Empty, None, Some("jserrors"));
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The agent reads a TOML file (see [`config::AgentConfig`]). If the file
//! does not exist a default one is written.

pub mod agent;
pub mod config;
pub mod error;
pub mod feature;
pub mod harvest;
pub mod logging;
pub mod registry;

pub use agent::{generate_agent_id, Agent};
pub use config::{AgentConfig, DecisionSettings, DrainSettings, HarvestSettings, LoggingSettings, RuntimeSettings};
pub use error::AgentError;
pub use feature::{Feature, FeatureContext};
pub use harvest::{endpoints, HarvestBuffers, SharedBuffer};
pub use registry::{global_registry, AgentRegistry};

use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loads the configuration at `config_path`, sets up logging and starts an
/// agent registered in the global registry.
pub async fn init(config_path: &Path) -> Result<Arc<Agent>, Box<dyn std::error::Error>> {
    let config = AgentConfig::load_from_file(config_path).await?;
    config.validate().map_err(AgentError::Config)?;

    logging::setup_logging(&config.logging, false)?;

    let agent = start(config)?;
    info!("🎉 Telemetry agent '{}' ready", agent.id());
    Ok(agent)
}

/// Starts an agent from an already loaded configuration and registers it
/// in the global registry.
pub fn start(config: AgentConfig) -> Result<Arc<Agent>, AgentError> {
    config.validate().map_err(AgentError::Config)?;
    global_registry().init(Agent::new(config))
}
