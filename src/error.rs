//! Error handling for the proc-graceful coordinator.
//!
//! Every failure the coordinator can report is one [`Error`] value, carrying
//! an [`ErrorCode`] for structured logging and an [`ErrorKind`] for callers
//! that need to branch on the failure category.
//!
//! # Error Structure
//!
//! * **Error Code**: A stable identifier for programmatic handling and logs
//! * **Message**: A human-readable description of the error
//! * **Source**: The underlying error, kept unchanged so it can be downcast
//!
//! # Usage Examples
//!
//! ```no_run
//! use proc_graceful::{ErrorKind, Result};
//!
//! fn report(result: Result<()>) {
//!     match result {
//!         Ok(()) => println!("service stopped gracefully"),
//!         Err(e) if e.kind() == ErrorKind::ShutdownTimeout => {
//!             eprintln!("shutdown took too long: {e}");
//!         }
//!         Err(e) => eprintln!("service failed: {e}"),
//!     }
//! }
//! ```

/// Result type alias for proc-graceful operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type accepted from caller-supplied operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error code enum for categorizing and identifying errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    // Configuration errors: 1000-1999
    /// Configuration failed validation
    ConfigInvalid = 1000,
    /// Configuration could not be parsed or extracted
    ConfigParse = 1001,

    // Signal handling errors: 2000-2999
    /// An OS signal listener could not be registered
    SignalRegisterFailed = 2000,

    // Shutdown errors: 3000-3999
    /// The shutdown operation did not finish before its deadline
    ShutdownTimeout = 3000,
    /// The shutdown operation reported a failure
    ShutdownFailed = 3002,

    // Start errors: 4000-4999
    /// The start operation stopped for a reason other than shutdown
    StartFailed = 4000,

    // Runtime errors: 6000-6999
    /// A background task ended without reporting its outcome
    RuntimeTaskFailed = 6000,
    /// The global tracing subscriber could not be installed
    LoggingInitFailed = 6001,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), *self as i32)
    }
}

impl ErrorCode {
    /// Convert error code to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigParse => "CONFIG_PARSE",
            Self::SignalRegisterFailed => "SIGNAL_REGISTER_FAILED",
            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            Self::ShutdownFailed => "SHUTDOWN_FAILED",
            Self::StartFailed => "START_FAILED",
            Self::RuntimeTaskFailed => "RUNTIME_TASK_FAILED",
            Self::LoggingInitFailed => "LOGGING_INIT_FAILED",
        }
    }
}

/// Failure category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The start operation returned an error unrelated to a requested shutdown.
    StartFailure,
    /// The shutdown operation did not complete within its deadline.
    ShutdownTimeout,
    /// The shutdown operation completed but reported a failure.
    ShutdownFailure,
    /// OS signal registration failed.
    Signal,
    /// Configuration was invalid or could not be loaded.
    Config,
    /// Runtime plumbing failed (task died, subscriber already installed).
    Runtime,
}

/// Error type for all coordinator operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The start operation stopped for a reason other than a requested shutdown
    #[error("Start failed [{code}]: {message}")]
    Start {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// The error returned by the start operation, unchanged
        #[source]
        source: BoxError,
    },

    /// The shutdown operation exceeded its deadline
    #[error("Shutdown timed out [{code}] after {timeout_ms}ms")]
    ShutdownTimeout {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Deadline that was exceeded, in milliseconds
        timeout_ms: u64,
        /// Error returned by the shutdown operation after the deadline, if any
        #[source]
        source: Option<BoxError>,
    },

    /// The shutdown operation reported a failure
    #[error("Shutdown failed [{code}]: {message}")]
    Shutdown {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// The error returned by the shutdown operation, unchanged
        #[source]
        source: BoxError,
    },

    /// Signal handling errors
    #[error("Signal handling error [{code}]: {message}{signal:?}")]
    Signal {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Signal number if applicable
        signal: Option<i32>,
        /// Optional source error for better context
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration-related errors
    #[error("Configuration error [{code}]: {message}")]
    Config {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Runtime errors
    #[error("Runtime error [{code}]: {message}")]
    Runtime {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
    },
}

impl Error {
    /// Wrap an error returned by the start operation.
    pub fn start<E: Into<BoxError>>(source: E) -> Self {
        let source = source.into();
        Self::Start {
            code: ErrorCode::StartFailed,
            message: source.to_string(),
            source,
        }
    }

    /// Create a deadline-exceeded shutdown error.
    #[must_use]
    pub fn shutdown_timeout(timeout_ms: u64) -> Self {
        Self::ShutdownTimeout {
            code: ErrorCode::ShutdownTimeout,
            timeout_ms,
            source: None,
        }
    }

    /// Create a deadline-exceeded shutdown error carrying the late error.
    pub fn shutdown_timeout_with_source<E: Into<BoxError>>(timeout_ms: u64, source: E) -> Self {
        Self::ShutdownTimeout {
            code: ErrorCode::ShutdownTimeout,
            timeout_ms,
            source: Some(source.into()),
        }
    }

    /// Wrap an error returned by the shutdown operation.
    pub fn shutdown<E: Into<BoxError>>(source: E) -> Self {
        let source = source.into();
        Self::Shutdown {
            code: ErrorCode::ShutdownFailed,
            message: source.to_string(),
            source,
        }
    }

    /// Create a signal registration error with signal number.
    pub fn signal_with_number<S: Into<String>>(
        message: S,
        signal: i32,
        source: std::io::Error,
    ) -> Self {
        Self::Signal {
            code: ErrorCode::SignalRegisterFailed,
            message: message.into(),
            signal: Some(signal),
            source: Some(source),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigInvalid,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new configuration error with a source error.
    pub fn config_with_source<S: Into<String>, E: Into<BoxError>>(message: S, source: E) -> Self {
        Self::Config {
            code: ErrorCode::ConfigParse,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new runtime error with specific code.
    pub fn runtime_with_code<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Runtime {
            code,
            message: message.into(),
        }
    }

    /// Failure category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Start { .. } => ErrorKind::StartFailure,
            Self::ShutdownTimeout { .. } => ErrorKind::ShutdownTimeout,
            Self::Shutdown { .. } => ErrorKind::ShutdownFailure,
            Self::Signal { .. } => ErrorKind::Signal,
            Self::Config { .. } => ErrorKind::Config,
            Self::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Structured error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Start { code, .. }
            | Self::ShutdownTimeout { code, .. }
            | Self::Shutdown { code, .. }
            | Self::Signal { code, .. }
            | Self::Config { code, .. }
            | Self::Runtime { code, .. } => *code,
        }
    }

    /// Check if this error is a shutdown deadline being exceeded.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ShutdownTimeout { .. })
    }

    /// Check if a caller may reasonably retry with a fresh service instance.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ShutdownTimeout { .. })
    }

    /// Get the error category for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::ShutdownTimeout { .. } => "timeout",
            Self::Shutdown { .. } => "shutdown",
            Self::Signal { .. } => "signal",
            Self::Config { .. } => "config",
            Self::Runtime { .. } => "runtime",
        }
    }

    /// Take back the error produced by a caller-supplied operation.
    ///
    /// Returns the start or shutdown operation's own error, or `None` for
    /// errors raised by the coordinator itself.
    #[must_use]
    pub fn into_source(self) -> Option<BoxError> {
        match self {
            Self::Start { source, .. } | Self::Shutdown { source, .. } => Some(source),
            Self::ShutdownTimeout { source, .. } => source,
            _ => None,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::config_with_source("Configuration loading failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_start_error_is_kept_verbatim() {
        let err = Error::start(io::Error::new(io::ErrorKind::AddrInUse, "address already in use"));
        assert_eq!(err.kind(), ErrorKind::StartFailure);
        assert_eq!(err.code(), ErrorCode::StartFailed);
        assert!(err.to_string().contains("address already in use"));

        let source = err.source().and_then(|s| s.downcast_ref::<io::Error>());
        assert_eq!(source.map(io::Error::kind), Some(io::ErrorKind::AddrInUse));

        let inner = err.into_source().unwrap();
        assert_eq!(
            inner.downcast::<io::Error>().unwrap().kind(),
            io::ErrorKind::AddrInUse
        );
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::shutdown_timeout(5000);
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.category(), "timeout");
        assert_eq!(err.kind(), ErrorKind::ShutdownTimeout);
        assert!(err.to_string().contains("5000ms"));
        assert!(err.into_source().is_none());
    }

    #[test]
    fn test_shutdown_failure() {
        let err = Error::shutdown("listener refused to close");
        assert_eq!(err.kind(), ErrorKind::ShutdownFailure);
        assert!(!err.is_timeout());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("listener refused to close"));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ShutdownTimeout.to_string(), "SHUTDOWN_TIMEOUT(3000)");
        assert_eq!(ErrorCode::StartFailed.as_str(), "START_FAILED");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("Shutdown timeout must be greater than 0");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
        assert!(err.into_source().is_none());
    }
}
