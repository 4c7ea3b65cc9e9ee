//! Tracing subscriber setup.
//!
//! The coordinator itself only emits `tracing` events; binaries embedding it
//! can call [`init_logging`] once at startup to print them.

use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;
use crate::error::{Error, ErrorCode, Result};

/// Build the event filter: `RUST_LOG` directives plus the configured level.
fn build_filter(config: &LogConfig) -> EnvFilter {
    let level: tracing::Level = config.level.into();
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Install a global tracing subscriber configured from `config`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed, or if JSON
/// output is requested without the `json-logs` feature.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config);

    if config.json {
        #[cfg(feature = "json-logs")]
        {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber).map_err(|e| {
                Error::runtime_with_code(
                    ErrorCode::LoggingInitFailed,
                    format!("Failed to initialize JSON logging: {e}"),
                )
            })?;
            return Ok(());
        }

        #[cfg(not(feature = "json-logs"))]
        {
            return Err(Error::config(
                "JSON logging requested but feature not enabled",
            ));
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(config.color)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        Error::runtime_with_code(
            ErrorCode::LoggingInitFailed,
            format!("Failed to initialize logging: {e}"),
        )
    })?;

    debug!("Logging initialized with level: {:?}", config.level);
    Ok(())
}
