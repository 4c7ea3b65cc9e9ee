//! Call-scoped termination triggers.
//!
//! A [`SignalListener`] owns the OS signal streams for exactly one
//! coordinator run. Each run creates its own streams and dropping the
//! listener drops them, so concurrent or back-to-back runs never share or
//! steal each other's signals.
//!
//! Tokio installs its OS handler for a signal the first time any stream for
//! it is created and never uninstalls it. Once a run has listened for
//! SIGINT or SIGTERM, a later delivery with no live listener is swallowed
//! instead of terminating the process.

use std::future::pending;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SignalConfig;
use crate::error::Result;

/// What caused a shutdown to begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An OS termination signal was delivered (raw signal number).
    Signal(i32),
    /// The externally supplied cancellation token fired.
    Cancelled,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(sig) => write!(f, "Signal({sig})"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Helper function to get a human-readable description of a signal.
#[must_use]
pub const fn signal_description(signal: i32) -> &'static str {
    match signal {
        1 => "SIGHUP (Hangup)",
        2 => "SIGINT (Interrupt/Ctrl+C)",
        3 => "SIGQUIT (Quit)",
        6 => "SIGABRT (Abort)",
        15 => "SIGTERM (Terminate)",
        _ => "Unknown signal",
    }
}

const SIGINT: i32 = 2;
const SIGTERM: i32 = 15;

/// OS signal streams registered for a single coordinator run.
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
    #[cfg(windows)]
    interrupt: Option<tokio::signal::windows::CtrlC>,
    #[cfg(windows)]
    terminate: Option<tokio::signal::windows::CtrlShutdown>,
}

#[cfg(unix)]
impl SignalListener {
    /// Register fresh streams for the signals enabled in `config`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an `Error::Signal` if the OS refuses a registration.
    pub fn register(config: &SignalConfig) -> Result<Self> {
        use crate::error::Error;
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt = if bool::from(config.interrupt) {
            Some(signal(SignalKind::interrupt()).map_err(|e| {
                Error::signal_with_number("Failed to register SIGINT handler", SIGINT, e)
            })?)
        } else {
            None
        };

        let terminate = if bool::from(config.terminate) {
            Some(signal(SignalKind::terminate()).map_err(|e| {
                Error::signal_with_number("Failed to register SIGTERM handler", SIGTERM, e)
            })?)
        } else {
            None
        };

        debug!(
            sigint = interrupt.is_some(),
            sigterm = terminate.is_some(),
            "Unix signal listeners registered"
        );

        Ok(Self {
            interrupt,
            terminate,
        })
    }
}

#[cfg(windows)]
impl SignalListener {
    /// Register fresh streams for the console events enabled in `config`.
    ///
    /// # Errors
    ///
    /// Returns an `Error::Signal` if the OS refuses a registration.
    pub fn register(config: &SignalConfig) -> Result<Self> {
        use crate::error::Error;
        use tokio::signal::windows::{ctrl_c, ctrl_shutdown};

        let interrupt = if bool::from(config.interrupt) {
            Some(ctrl_c().map_err(|e| {
                Error::signal_with_number("Failed to register Ctrl+C handler", SIGINT, e)
            })?)
        } else {
            None
        };

        let terminate = if bool::from(config.terminate) {
            Some(ctrl_shutdown().map_err(|e| {
                Error::signal_with_number("Failed to register shutdown handler", SIGTERM, e)
            })?)
        } else {
            None
        };

        debug!(
            ctrl_c = interrupt.is_some(),
            shutdown = terminate.is_some(),
            "Windows console event listeners registered"
        );

        Ok(Self {
            interrupt,
            terminate,
        })
    }
}

impl SignalListener {
    /// Wait until an enabled OS signal arrives or `external` is cancelled.
    ///
    /// Sources race with no priority. Consuming `self` drops the signal
    /// streams as soon as a trigger has been observed. With no enabled
    /// signal and no token this never resolves.
    pub async fn wait(self, external: Option<&CancellationToken>) -> Trigger {
        let Self {
            mut interrupt,
            mut terminate,
        } = self;

        let trigger = tokio::select! {
            () = recv(interrupt.as_mut()) => Trigger::Signal(SIGINT),
            () = recv(terminate.as_mut()) => Trigger::Signal(SIGTERM),
            () = cancelled(external) => Trigger::Cancelled,
        };

        match trigger {
            Trigger::Signal(sig) => {
                info!(signal = sig, "Received {}", signal_description(sig));
            }
            Trigger::Cancelled => info!("External cancellation observed"),
        }
        trigger
    }
}

#[cfg(unix)]
async fn recv(stream: Option<&mut tokio::signal::unix::Signal>) {
    match stream {
        // A closed stream yields `None`; treat it as never firing.
        Some(s) => {
            if s.recv().await.is_none() {
                pending::<()>().await;
            }
        }
        None => pending().await,
    }
}

#[cfg(windows)]
async fn recv<S: WindowsEvent>(stream: Option<&mut S>) {
    match stream {
        Some(s) => {
            if s.next_event().await.is_none() {
                pending::<()>().await;
            }
        }
        None => pending().await,
    }
}

#[cfg(windows)]
trait WindowsEvent {
    async fn next_event(&mut self) -> Option<()>;
}

#[cfg(windows)]
impl WindowsEvent for tokio::signal::windows::CtrlC {
    async fn next_event(&mut self) -> Option<()> {
        self.recv().await
    }
}

#[cfg(windows)]
impl WindowsEvent for tokio::signal::windows::CtrlShutdown {
    async fn next_event(&mut self) -> Option<()> {
        self.recv().await
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}
