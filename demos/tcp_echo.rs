//! TCP echo server with graceful shutdown.
//!
//! ```text
//! cargo run --example tcp_echo
//! GRACEFUL_SHUTDOWN__TIMEOUT_MS=2000 cargo run --example tcp_echo
//! ```
//!
//! Press Ctrl+C (or send SIGTERM) to stop accepting, then open connections
//! get until the shutdown deadline to finish.

use proc_graceful::{logging, Config, Error, Graceful, ShutdownContext};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const ADDR: &str = "127.0.0.1:7878";

async fn echo(mut stream: TcpStream, closing: CancellationToken) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::select! {
            () = closing.cancelled() => return Ok(()),
            read = stream.read(&mut buf) => read?,
        };
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
    }
}

async fn serve(
    listener: TcpListener,
    tracker: TaskTracker,
    accept_closing: CancellationToken,
    conn_closing: CancellationToken,
) -> io::Result<()> {
    loop {
        tokio::select! {
            () = accept_closing.cancelled() => {
                info!("Listener closed");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(%peer, "Accepted connection");
                let closing = conn_closing.child_token();
                tracker.spawn(async move {
                    if let Err(e) = echo(stream, closing).await {
                        warn!(%peer, error = %e, "Connection failed");
                    }
                });
            }
        }
    }
}

async fn drain(
    ctx: ShutdownContext,
    tracker: TaskTracker,
    closing: CancellationToken,
) -> io::Result<()> {
    info!(trigger = %ctx.trigger(), "Draining connections");
    tracker.close();

    tokio::select! {
        () = tracker.wait() => Ok(()),
        () = ctx.cancelled() => {
            // Deadline hit: tell the remaining connections to stop.
            closing.cancel();
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{} connections still open", tracker.len()),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> proc_graceful::Result<()> {
    let config = Config::load()?;
    logging::init_logging(&config.logging)?;

    // Bound before the coordinator starts, so a busy port fails fast.
    let listener = TcpListener::bind(ADDR).await.map_err(Error::start)?;
    info!(addr = ADDR, timeout = ?config.shutdown_timeout(), "Echo server listening");

    let tracker = TaskTracker::new();
    let accept_closing = CancellationToken::new();
    let conn_closing = CancellationToken::new();

    let serve_tracker = tracker.clone();
    let serve_closing = accept_closing.clone();
    let serve_conns = conn_closing.clone();

    Graceful::from_config(&config)
        .run(
            move || serve(listener, serve_tracker, serve_closing, serve_conns),
            move |ctx| async move {
                accept_closing.cancel();
                drain(ctx, tracker, conn_closing).await
            },
        )
        .await
}
