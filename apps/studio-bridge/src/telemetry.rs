use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Installs the global subscriber. Logs go to stderr because stdout carries
/// the MCP protocol stream. `RUST_LOG` wins over the default filter;
/// `quiet` lowers the default to `warn`, which hides per-request traces.
pub fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    Registry::default().with(env_filter).with(fmt_layer).init();
}
