//! Deadline-bound execution of the shutdown operation.
//!
//! The shutdown operation receives a [`ShutdownContext`]: a cancellation
//! token that fires when the shutdown deadline elapses, plus the deadline
//! itself and the trigger that started the shutdown. Operations are expected
//! to watch the context and return promptly once it is cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::error::{BoxError, Error, Result};
use crate::signal::Trigger;

/// Process-wide default shutdown deadline in milliseconds.
static DEFAULT_TIMEOUT_MS: AtomicU64 = AtomicU64::new(crate::DEFAULT_SHUTDOWN_TIMEOUT_MS);

// Cap for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Current process-wide default shutdown deadline.
#[must_use]
pub fn default_timeout() -> Duration {
    Duration::from_millis(default_timeout_ms())
}

pub(crate) fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS.load(Ordering::Acquire)
}

/// Override the process-wide default shutdown deadline.
///
/// Affects coordinators and configurations created afterwards; explicit
/// per-call timeouts still take precedence. A zero duration is ignored.
pub fn set_default_timeout(timeout: Duration) {
    let ms = duration_ms(timeout);
    if ms == 0 {
        warn!("Ignoring zero default shutdown timeout");
        return;
    }
    DEFAULT_TIMEOUT_MS.store(ms, Ordering::Release);
    debug!(timeout_ms = ms, "Updated default shutdown timeout");
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Deadline-bearing cancellation context handed to the shutdown operation.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
    trigger: Trigger,
}

impl ShutdownContext {
    fn new(timeout: Duration, trigger: Trigger) -> Self {
        let now = Instant::now();
        Self {
            token: CancellationToken::new(),
            deadline: now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE),
            timeout,
            trigger,
        }
    }

    /// Instant at which the shutdown is considered failed.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Total time allotted to the shutdown operation.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Resolves once the deadline elapses or the operation has returned.
    ///
    /// Inside the shutdown operation this fires at the deadline; the
    /// operation should then stop waiting and return.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Whether the context has been cancelled.
    ///
    /// Check [`is_expired`](Self::is_expired) to tell a missed deadline apart.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token, for handing to work spawned by the operation.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// What started this shutdown.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }
}

/// Run `shutdown` under a deadline of `timeout` and classify its outcome.
///
/// At the deadline the context token is cancelled while the operation is
/// still running, and the operation is polled again so it can observe the
/// cancellation and return. An operation that still has not returned is
/// left to finish on its own task and the shutdown is reported as timed out.
pub(crate) async fn execute<D, DF, E>(shutdown: D, timeout: Duration, trigger: Trigger) -> Result<()>
where
    D: FnOnce(ShutdownContext) -> DF,
    DF: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let ctx = ShutdownContext::new(timeout, trigger);
    let token = ctx.token.clone();
    let deadline = ctx.deadline;
    let timeout_ms = duration_ms(timeout);

    info!(timeout_ms, %trigger, "Running shutdown operation");
    let started = Instant::now();
    let mut operation = Box::pin(shutdown(ctx));

    let finished = tokio::select! {
        biased;
        outcome = &mut operation => Some(outcome),
        () = tokio::time::sleep_until(deadline) => None,
    };

    let (outcome, cancelled_first) = match finished {
        Some(outcome) => {
            // Anything still holding a clone of the context is done.
            token.cancel();
            (outcome, false)
        }
        None => {
            warn!(timeout_ms, "Shutdown deadline exceeded, cancelling context");
            token.cancel();
            tokio::select! {
                biased;
                outcome = &mut operation => (outcome, true),
                () = tokio::task::yield_now() => {
                    tokio::spawn(
                        async move {
                            let finished_ok = operation.await.is_ok();
                            debug!(finished_ok, "Abandoned shutdown operation returned");
                        }
                        .in_current_span(),
                    );
                    return Err(Error::shutdown_timeout(timeout_ms));
                }
            }
        }
    };

    match outcome {
        Ok(()) if !cancelled_first => {
            info!(elapsed = ?started.elapsed(), "Shutdown completed");
            Ok(())
        }
        Ok(()) => {
            warn!(timeout_ms, "Shutdown operation returned after its deadline");
            Err(Error::shutdown_timeout(timeout_ms))
        }
        Err(e) if cancelled_first || Instant::now() >= deadline => {
            warn!(timeout_ms, "Shutdown operation failed after its deadline");
            Err(Error::shutdown_timeout_with_source(timeout_ms, e))
        }
        Err(e) => {
            let err = Error::shutdown(e);
            warn!(error = %err, "Shutdown operation failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_deadline() {
        let result = execute(
            |ctx: ShutdownContext| async move {
                assert!(!ctx.is_expired());
                assert_eq!(ctx.trigger(), Trigger::Cancelled);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<(), io::Error>(())
            },
            Duration::from_secs(5),
            Trigger::Cancelled,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let result = execute(
            |_ctx| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<(), io::Error>(())
            },
            Duration::from_secs(5),
            Trigger::Signal(15),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShutdownTimeout);
        assert!(err.to_string().contains("5000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_cancelled_at_deadline() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let result = execute(
            |ctx: ShutdownContext| async move {
                let watched = ctx.clone();
                tokio::spawn(async move {
                    watched.cancelled().await;
                    let _ = tx.send(watched.is_expired());
                });
                std::future::pending::<std::result::Result<(), io::Error>>().await
            },
            Duration::from_millis(200),
            Trigger::Cancelled,
        )
        .await;

        assert!(result.unwrap_err().is_timeout());
        assert!(rx.await.unwrap(), "spawned work should see the expired context");
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_observes_its_deadline() {
        let observed = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&observed);

        let result = execute(
            move |ctx: ShutdownContext| async move {
                ctx.cancelled().await;
                seen.store(ctx.is_expired(), Ordering::SeqCst);
                Err::<(), _>(io::Error::new(io::ErrorKind::TimedOut, "context deadline exceeded"))
            },
            Duration::from_secs(5),
            Trigger::Cancelled,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(observed.load(Ordering::SeqCst), "operation should see the deadline fire");
        let source = err.into_source().unwrap().downcast::<io::Error>().unwrap();
        assert_eq!(source.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_operation_is_not_killed() {
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);

        let result = execute(
            move |_ctx| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                done.store(true, Ordering::SeqCst);
                Ok::<(), io::Error>(())
            },
            Duration::from_secs(5),
            Trigger::Cancelled,
        )
        .await;

        assert!(result.unwrap_err().is_timeout());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(finished.load(Ordering::SeqCst), "abandoned operation should run to completion");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_surfaced() {
        let result = execute(
            |_ctx| async move { Err(io::Error::new(io::ErrorKind::BrokenPipe, "listener gone")) },
            Duration::from_secs(5),
            Trigger::Cancelled,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShutdownFailure);
        let source = err.into_source().unwrap().downcast::<io::Error>().unwrap();
        assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_after_deadline_counts_as_timeout() {
        let result = execute(
            |ctx: ShutdownContext| async move {
                // Finishes exactly at the deadline, racing the timer.
                tokio::time::sleep_until(ctx.deadline()).await;
                Err::<(), _>(io::Error::new(io::ErrorKind::TimedOut, "context deadline exceeded"))
            },
            Duration::from_secs(1),
            Trigger::Cancelled,
        )
        .await;

        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_secs(2)), 2000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
