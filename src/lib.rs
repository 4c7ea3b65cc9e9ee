#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
//! # proc-graceful: Graceful Start/Shutdown Coordination
//!
//! Wraps any long-running service (a listener loop, a worker, a server) with
//! consistent, time-bounded shutdown semantics. You supply how to start and
//! how to stop; the coordinator decides when, and reconciles the outcome.
//!
//! ## Key Features
//!
//! - **Scoped Signal Handling**: SIGINT/SIGTERM listeners created per run and dropped on every exit path
//!   (tokio keeps its process-level handler installed afterwards, see [`signal`])
//! - **External Cancellation**: Any `CancellationToken` can trigger shutdown alongside OS signals
//! - **Deadline-Bound Shutdown**: The shutdown operation gets a context that expires after a configurable timeout
//! - **Typed Outcomes**: Start failures, shutdown timeouts and shutdown failures are distinct error kinds
//! - **Configuration**: Layered defaults, TOML file and environment variables
//! - **Structured Logging**: `tracing` events throughout, with an optional subscriber setup helper
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proc_graceful::{Graceful, Result, ShutdownContext};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let closing = CancellationToken::new();
//!     let serving = closing.clone();
//!
//!     // Runs until SIGINT/SIGTERM, then gives shutdown 5 seconds.
//!     Graceful::new()
//!         .run(
//!             move || async move {
//!                 serving.cancelled().await; // the accept loop would live here
//!                 Ok::<(), std::io::Error>(())
//!             },
//!             move |ctx: ShutdownContext| async move {
//!                 tracing::info!(trigger = %ctx.trigger(), "stopping");
//!                 closing.cancel();
//!                 Ok::<(), std::io::Error>(())
//!             },
//!         )
//!         .await
//! }
//! ```

// Private modules
mod config;
mod error;

// Public modules
pub mod graceful;
pub mod logging;
pub mod shutdown;
pub mod signal;

// Public exports
pub use config::{
    Config, ConfigBuilder, LogConfig, LogLevel, ShutdownConfig, SignalConfig, SignalHandling,
    ENV_PREFIX,
};
pub use error::{BoxError, Error, ErrorCode, ErrorKind, Result};
pub use graceful::{run, Graceful};
pub use shutdown::ShutdownContext;
pub use signal::Trigger;

/// Version of the proc-graceful library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default shutdown timeout in milliseconds
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "graceful.toml";
