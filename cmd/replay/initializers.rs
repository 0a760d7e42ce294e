use eyre::eyre;
use tracing_subscriber::{EnvFilter, filter::Directive};

/// Installs the global subscriber. `RUST_LOG` directives take precedence over
/// `log_level`.
pub fn init_tracing(log_level: &str) -> eyre::Result<()> {
    let directive: Directive = log_level.parse()?;
    let log_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .try_init()
        .map_err(|err| eyre!(err))
}
