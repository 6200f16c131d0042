//! Line transport: TCP listener and stdio session.
//!
//! Every connection gets its own [`Interpreter`]. Lines are read one at a
//! time and each gets exactly one `\n`-terminated reply before the next line
//! is read.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::interpreter::{Interpreter, RelayContext};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The controller sent `exit`.
    Exit,
    /// The controller closed its side.
    Disconnected,
    /// No command arrived within the idle timeout.
    IdleTimeout,
    /// The relay is shutting down.
    Shutdown,
}

/// Binds the TCP listener.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::config(format!("Failed to listen on {addr}: {e}")))
}

/// Accepts connections until `shutdown` is cancelled.
pub async fn serve_tcp(
    listener: TcpListener,
    ctx: RelayContext,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutting down listener");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
        };

        let ctx = ctx.clone();
        let token = shutdown.child_token();
        tokio::spawn(async move {
            handle_tcp(stream, peer, ctx, idle_timeout, token).await;
        });
    }
}

async fn handle_tcp(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: RelayContext,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
) {
    info!(%peer, "Controller connected");
    let (reader, writer) = stream.into_split();
    match serve_connection(reader, writer, ctx, idle_timeout, shutdown).await {
        Ok(end) => info!(%peer, ?end, "Controller disconnected"),
        Err(e) => warn!(%peer, "Connection error: {}", e),
    }
}

/// Serves one session on stdin/stdout.
pub async fn serve_stdio(ctx: RelayContext, shutdown: CancellationToken) -> Result<SessionEnd> {
    info!("Serving one session on stdio");
    serve_connection(tokio::io::stdin(), tokio::io::stdout(), ctx, None, shutdown).await
}

/// Runs the read-interpret-reply loop over any line stream.
pub async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    ctx: RelayContext,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
) -> Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut interpreter = Interpreter::new(ctx);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            next = next_line(&mut lines, idle_timeout) => next?,
        };
        let line = match next {
            NextLine::Line(line) => line,
            NextLine::Eof => return Ok(SessionEnd::Disconnected),
            NextLine::TimedOut => return Ok(SessionEnd::IdleTimeout),
        };

        let reply = interpreter.run(line.trim_end_matches('\r')).await;
        let mut text = reply.to_string().replace(['\r', '\n'], " ");
        text.push('\n');
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;

        if reply.is_exit() {
            return Ok(SessionEnd::Exit);
        }
    }
}

enum NextLine {
    Line(String),
    Eof,
    TimedOut,
}

async fn next_line<R>(
    lines: &mut tokio::io::Lines<BufReader<R>>,
    idle_timeout: Option<Duration>,
) -> Result<NextLine>
where
    R: AsyncRead + Unpin,
{
    let read = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
            Ok(read) => read,
            Err(_) => return Ok(NextLine::TimedOut),
        },
        None => lines.next_line().await,
    };
    Ok(match read? {
        Some(line) => NextLine::Line(line),
        None => NextLine::Eof,
    })
}
