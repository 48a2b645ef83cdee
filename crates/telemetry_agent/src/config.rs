//! Configuration management for the telemetry agent.
//!
//! The agent reads its settings from a TOML file. A missing file is replaced
//! by a default one so that a first run leaves an editable template behind.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use telemetry_event_system::{features, FeaturePriority, MAX_PAYLOAD_SIZE};
use tracing::info;

fn default_max_payload_size() -> usize {
    MAX_PAYLOAD_SIZE
}

fn default_feature_priority() -> Vec<String> {
    features::DEFAULT_ORDER.iter().map(|f| f.to_string()).collect()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_level() -> String {
    "info".to_string()
}

/// Agent configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Harvest buffer settings
    #[serde(default)]
    pub harvest: HarvestSettings,
    /// Drain gate settings
    #[serde(default)]
    pub drain: DrainSettings,
    /// Decision cache settings
    #[serde(default)]
    pub decision: DecisionSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Emitter scope settings
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

/// Size limits for harvest buffers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSettings {
    /// Ceiling on the estimated size of one endpoint buffer, in bytes
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
        }
    }
}

/// Replay order of drain groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSettings {
    /// Group names, first drains first. Unlisted groups rank ahead of all.
    #[serde(default = "default_feature_priority")]
    pub feature_priority: Vec<String>,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            feature_priority: default_feature_priority(),
        }
    }
}

/// Decision cache timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSettings {
    /// Milliseconds before an undecided cache discards its queue
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level for the agent's own crates (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Give each agent scope its own backlog instead of sharing the root's
    #[serde(default)]
    pub isolated_backlog: bool,
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration is written to
    /// `path` and returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AgentConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AgentConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.harvest.max_payload_size == 0 {
            return Err("harvest.max_payload_size must be greater than 0".to_string());
        }

        if self.decision.timeout_ms == 0 {
            return Err("decision.timeout_ms must be greater than 0".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for group in &self.drain.feature_priority {
            if group.is_empty() {
                return Err("drain.feature_priority cannot contain empty names".to_string());
            }
            if !seen.insert(group.as_str()) {
                return Err(format!("drain.feature_priority lists '{group}' twice"));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn feature_priority(&self) -> FeaturePriority {
        FeaturePriority::from_order(&self.drain.feature_priority)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision.timeout_ms)
    }
}
