use std::net::SocketAddr;

use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize logging from the `[logging]` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.json)
}

/// Initialize tracing with custom configuration.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    }

    tracing::info!(level, json = json_format, "logging initialized");
    Ok(())
}

/// Create the span every ext_proc stream runs in
pub fn create_stream_span(stream_id: &str, peer: Option<SocketAddr>) -> tracing::Span {
    tracing::info_span!(
        "ext_proc_stream",
        stream.id = stream_id,
        peer = peer.map(|p| p.to_string()).unwrap_or_default(),
    )
}

/// Span wrapping one listener's lifetime
pub fn create_listener_span(name: &str, addr: SocketAddr) -> tracing::Span {
    tracing::info_span!("listener", name, addr = %addr)
}
