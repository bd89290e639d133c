//! Process-wide tracing setup shared by the CLI steps and the server.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber once.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Events are
/// written to stderr; stdout is reserved for command output.
pub fn init_logging(default_level: &str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
