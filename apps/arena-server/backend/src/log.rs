//! Logging for the arena server.
//!
//! Everything logs through `tracing`. [`setup`] installs a stdout subscriber
//! whose default level comes from [`Config::log_level`] and applies both to
//! this crate and to the HTTP trace layer (`tower_http`), so request logs
//! follow the same verbosity as the vote logs.
//!
//! When `RUST_LOG` is set it replaces the default filter entirely (see
//! [`EnvFilter`][`tracing_subscriber::EnvFilter`]).

use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Crates whose events are shown at the configured level by default.
const LOGGED_CRATES: [&str; 2] = [env!("CARGO_CRATE_NAME"), "tower_http"];

fn default_filter(level: tracing::Level) -> String {
    LOGGED_CRATES
        .iter()
        .map(|krate| format!("{krate}={}", level.as_str().to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Sets up error reports and logging. Call this before anything that might
/// want to log.
pub fn setup(config: &Config) -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::try_from_default_env()?
    } else {
        EnvFilter::try_new(default_filter(config.log_level))?
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();

    Ok(())
}
