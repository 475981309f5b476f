//! Subcommand implementations

pub mod inspect;
pub mod weave;

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber; `RUST_LOG` overrides the default level
pub fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
