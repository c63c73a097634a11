//! Diagnostic tracing for the research agent.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`. It is never product
//! output: the evidence store and the run log (`io/run_log`) are written the
//! same way whatever the filter says.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber: `RUST_LOG` filter (default `warn`) and a
/// compact formatter on stderr.
///
/// ```bash
/// RUST_LOG=research_agent=info research-agent --goal "how does rust prevent data races"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
