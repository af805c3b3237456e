use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AgentError, Result};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global `fmt` subscriber, as text or one JSON object per line.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(json: bool) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter());
    let installed = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|err| AgentError::Config(format!("failed to install tracing subscriber: {err}")))
}
