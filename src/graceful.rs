//! The shutdown coordinator.
//!
//! [`Graceful`] runs a start operation on the caller's task while a
//! background watcher waits for a termination trigger (an OS signal or an
//! external [`CancellationToken`]). Once triggered, the watcher runs the
//! shutdown operation under a deadline. The start operation is expected to
//! return `Ok(())` because of that shutdown, after which the coordinator
//! reports the shutdown outcome.
//!
//! ```no_run
//! use proc_graceful::{Graceful, ShutdownContext};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> proc_graceful::Result<()> {
//! let closing = CancellationToken::new();
//! let serve_closing = closing.clone();
//!
//! Graceful::new()
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .run(
//!         move || async move {
//!             // accept loop...
//!             serve_closing.cancelled().await;
//!             Ok::<(), std::io::Error>(())
//!         },
//!         move |_ctx: ShutdownContext| async move {
//!             closing.cancel();
//!             Ok::<(), std::io::Error>(())
//!         },
//!     )
//!     .await
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn, Instrument};

use crate::config::{Config, SignalConfig};
use crate::error::{BoxError, Error, ErrorCode, Result};
use crate::shutdown::{self, ShutdownContext};
use crate::signal::SignalListener;

/// Lifecycle phase of one coordinator run, reported at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    TriggerPending,
    StartReturned,
    ShuttingDown,
    Done,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::TriggerPending => "trigger-pending",
            Self::StartReturned => "start-returned",
            Self::ShuttingDown => "shutting-down",
            Self::Done => "done",
        }
    }

    fn enter(self) {
        debug!(phase = self.as_str(), "Coordinator phase");
    }
}

/// Coordinates a blocking start operation with a deadline-bound shutdown.
#[derive(Debug, Clone)]
pub struct Graceful {
    name: String,
    timeout: Duration,
    signals: SignalConfig,
    external: Option<CancellationToken>,
}

impl Graceful {
    /// Create a coordinator with the process-wide default deadline and both
    /// OS signals enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::from("proc-graceful"),
            timeout: shutdown::default_timeout(),
            signals: SignalConfig::default(),
            external: None,
        }
    }

    /// Create a coordinator from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            timeout: config.shutdown_timeout(),
            signals: config.signals,
            external: None,
        }
    }

    /// Set the service name recorded on the coordinator's tracing span.
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Set the deadline for the shutdown operation.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Also trigger shutdown when `token` is cancelled.
    ///
    /// The coordinator only observes the token; it never cancels it.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.external = Some(token);
        self
    }

    /// Choose which OS signals trigger shutdown.
    #[must_use]
    pub const fn with_signal_config(mut self, signals: SignalConfig) -> Self {
        self.signals = signals;
        self
    }

    /// Do not listen for OS signals; only the external token triggers shutdown.
    #[must_use]
    pub const fn without_signals(mut self) -> Self {
        self.signals = SignalConfig::disabled();
        self
    }

    /// Deadline the shutdown operation will be given.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `start` until it stops, shutting it down on the first trigger.
    ///
    /// `start` returning `Ok(())` means it stopped because shutdown was
    /// requested; the coordinator then waits for and returns the shutdown
    /// outcome. Any `Err` from `start` is returned immediately as
    /// [`Error::Start`] and the shutdown path is abandoned.
    ///
    /// With no trigger and a `start` that never returns, this never returns.
    ///
    /// # Errors
    ///
    /// * [`Error::Signal`] if OS signal registration fails
    /// * [`Error::Start`] if `start` fails for another reason
    /// * [`Error::ShutdownTimeout`] if `shutdown` misses its deadline
    /// * [`Error::Shutdown`] if `shutdown` reports a failure
    /// * [`Error::Runtime`] if the shutdown task dies without reporting
    #[instrument(skip_all, fields(service = %self.name))]
    pub async fn run<S, SF, SE, D, DF, DE>(self, start: S, shutdown: D) -> Result<()>
    where
        S: FnOnce() -> SF,
        SF: Future<Output = std::result::Result<(), SE>>,
        SE: Into<BoxError>,
        D: FnOnce(ShutdownContext) -> DF + Send + 'static,
        DF: Future<Output = std::result::Result<(), DE>> + Send + 'static,
        DE: Into<BoxError> + Send + 'static,
    {
        Phase::Idle.enter();
        let Self {
            timeout,
            signals,
            external,
            ..
        } = self;

        let listener = SignalListener::register(&signals)?;
        let (result_tx, result_rx) = oneshot::channel();
        let disarm = CancellationToken::new();
        // Stops a watcher that has not triggered yet on every exit path.
        let _disarm_guard = disarm.clone().drop_guard();

        tokio::spawn(
            watch(listener, external, disarm, shutdown, timeout, result_tx).in_current_span(),
        );

        Phase::Running.enter();
        if let Err(e) = start().await {
            let err = Error::start(e);
            warn!(error = %err, "Start operation failed, abandoning shutdown");
            return Err(err);
        }

        Phase::StartReturned.enter();
        let result = result_rx.await.unwrap_or_else(|_| {
            Err(Error::runtime_with_code(
                ErrorCode::RuntimeTaskFailed,
                "Shutdown task exited without reporting an outcome",
            ))
        });

        Phase::Done.enter();
        result
    }

    /// Like [`run`](Self::run), for a synchronous, thread-blocking `start`.
    ///
    /// `start` runs on tokio's blocking pool. A panic inside it is reported
    /// as [`Error::Start`].
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_blocking<S, SE, D, DF, DE>(self, start: S, shutdown: D) -> Result<()>
    where
        S: FnOnce() -> std::result::Result<(), SE> + Send + 'static,
        SE: Into<BoxError> + Send + 'static,
        D: FnOnce(ShutdownContext) -> DF + Send + 'static,
        DF: Future<Output = std::result::Result<(), DE>> + Send + 'static,
        DE: Into<BoxError> + Send + 'static,
    {
        self.run(
            move || async move {
                match tokio::task::spawn_blocking(start).await {
                    Ok(outcome) => outcome.map_err(Into::into),
                    Err(join) => Err(BoxError::from(join)),
                }
            },
            shutdown,
        )
        .await
    }
}

impl Default for Graceful {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `start` with the default coordinator, optionally also triggered by
/// `external`.
///
/// # Errors
///
/// See [`Graceful::run`].
pub async fn run<S, SF, SE, D, DF, DE>(
    start: S,
    shutdown: D,
    external: Option<CancellationToken>,
) -> Result<()>
where
    S: FnOnce() -> SF,
    SF: Future<Output = std::result::Result<(), SE>>,
    SE: Into<BoxError>,
    D: FnOnce(ShutdownContext) -> DF + Send + 'static,
    DF: Future<Output = std::result::Result<(), DE>> + Send + 'static,
    DE: Into<BoxError> + Send + 'static,
{
    let mut graceful = Graceful::new();
    graceful.external = external;
    graceful.run(start, shutdown).await
}

async fn watch<D, DF, DE>(
    listener: SignalListener,
    external: Option<CancellationToken>,
    disarm: CancellationToken,
    shutdown: D,
    timeout: Duration,
    result_tx: oneshot::Sender<Result<()>>,
) where
    D: FnOnce(ShutdownContext) -> DF,
    DF: Future<Output = std::result::Result<(), DE>> + Send + 'static,
    DE: Into<BoxError> + Send + 'static,
{
    Phase::TriggerPending.enter();
    let trigger = tokio::select! {
        () = disarm.cancelled() => {
            debug!("Coordinator finished before any trigger, dropping signal listeners");
            return;
        }
        trigger = listener.wait(external.as_ref()) => trigger,
    };

    Phase::ShuttingDown.enter();
    let result = shutdown::execute(shutdown, timeout, trigger).await;

    if result_tx.send(result).is_err() {
        debug!("Start already failed, discarding shutdown outcome");
    }
}
