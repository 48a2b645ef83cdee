//! Agent log output.
//!
//! The agent is embedded in a host process, so `[logging] level` only raises
//! or lowers the agent's own crates. Everything else the host pulls in stays
//! at `warn` unless `RUST_LOG` says otherwise.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose output follows `[logging] level`.
const AGENT_CRATES: [&str; 2] = ["telemetry_agent", "telemetry_event_system"];

/// Level for everything outside [`AGENT_CRATES`].
const HOST_LEVEL: &str = "warn";

/// Filter directives for `settings`, e.g. `warn,telemetry_agent=debug,...`.
pub fn filter_directives(settings: &LoggingSettings) -> String {
    let mut directives = String::from(HOST_LEVEL);
    for krate in AGENT_CRATES {
        directives.push_str(&format!(",{krate}={}", settings.level));
    }
    directives
}

/// Installs the agent's global subscriber.
///
/// A non-empty `RUST_LOG` replaces the directives built from `settings`.
/// Output is JSON when `[logging] json_format` is set or `json_format` is
/// passed. Installing twice returns an error rather than replacing the first
/// subscriber.
pub fn setup_logging(
    settings: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let directives = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(from_env) if !from_env.trim().is_empty() => from_env,
        _ => filter_directives(settings),
    };
    let filter = EnvFilter::try_new(&directives)?;
    let registry = tracing_subscriber::registry().with(filter);

    if json_format || settings.json_format {
        registry
            .with(fmt::layer().json().with_thread_names(true).with_current_span(false))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    info!("🔧 Agent logging on: {}", directives);
    Ok(())
}
