pub mod config;
pub mod lifecycle; // Managed local model server
pub mod models;
pub mod orchestrator; // Provider selection + fallback
pub mod pipeline;
pub mod providers;

pub use orchestrator::{ExtractOptions, Orchestrator, OrchestratorError};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
