//! Per-client connection handling.
//!
//! Each accepted connection runs [`handle_connection`] in its own task. The
//! loop reads one newline-terminated frame at a time and:
//!
//! - forwards valid tokens to the aggregator, waiting when its channel is full;
//! - triggers the shared shutdown on the terminator frame, then closes;
//! - closes silently on anything else.
//!
//! Nothing is ever written back to the client. The read timeout is rolling:
//! it restarts for every frame.

use std::{io, net::SocketAddr, time::Duration};

use numsrv_core::{
    FrameError,
    shutdown::{Shutdown, ShutdownReason, ShutdownSignal},
    token::{self, Frame, ValidatedToken},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info};

/// Longest line accepted while looking for the newline. A token with `\r\n`
/// needs 11 bytes; anything reaching this limit is rejected.
///
/// The limit applies to the raw line before trimming, so a valid token padded
/// with whitespace out to 64 bytes or more is rejected as
/// [`FrameError::TooLong`] on purpose.
pub const MAX_FRAME_LEN: usize = 64;

/// Why a connection was closed.
#[derive(Debug)]
pub enum CloseReason {
    /// Client closed its side. A trailing partial frame is discarded.
    Eof,
    /// No complete frame within the read timeout.
    Timeout,
    /// Malformed frame.
    Violation(FrameError),
    /// Client sent the terminator.
    Terminated,
    /// Shutdown observed while waiting for the next frame.
    Shutdown,
    /// The aggregator stopped accepting tokens.
    AggregatorGone,
    /// Socket read error.
    Io(io::Error),
}

/// Everything a connection task needs besides the stream itself.
#[derive(Clone)]
pub struct ConnectionContext {
    pub tx: mpsc::Sender<ValidatedToken>,
    pub shutdown: Shutdown,
    pub read_timeout: Duration,
}

/// Run the frame loop for one client until the connection closes.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: ConnectionContext) -> CloseReason
where
    S: AsyncRead + Unpin,
{
    let ConnectionContext { tx, shutdown, read_timeout } = ctx;
    let mut signal = shutdown.subscribe();

    let reason = frame_loop(stream, &tx, &shutdown, &mut signal, read_timeout).await;

    match &reason {
        CloseReason::Terminated => info!("[conn {peer}] terminator received, shutting down"),
        CloseReason::Violation(e) => debug!("[conn {peer}] closing: {e}"),
        CloseReason::Io(e) => debug!("[conn {peer}] closing: read error: {e}"),
        other => debug!("[conn {peer}] closing: {other:?}"),
    }
    reason
}

async fn frame_loop<S>(
    stream: S,
    tx: &mpsc::Sender<ValidatedToken>,
    shutdown: &Shutdown,
    signal: &mut ShutdownSignal,
    read_timeout: Duration,
) -> CloseReason
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut frame = Vec::with_capacity(MAX_FRAME_LEN);

    loop {
        frame.clear();

        let read = tokio::select! {
            biased;
            _ = signal.cancelled() => return CloseReason::Shutdown,
            read = tokio::time::timeout(read_timeout, read_frame(&mut reader, &mut frame)) => read,
        };

        let n = match read {
            Err(_elapsed) => return CloseReason::Timeout,
            Ok(Err(e)) => return CloseReason::Io(e),
            Ok(Ok(n)) => n,
        };

        if frame.last() != Some(&b'\n') {
            if n >= MAX_FRAME_LEN {
                return CloseReason::Violation(FrameError::TooLong(MAX_FRAME_LEN));
            }
            return CloseReason::Eof;
        }

        match token::classify(&frame) {
            Ok(Frame::Token(t)) => {
                if tx.send(t).await.is_err() {
                    return CloseReason::AggregatorGone;
                }
            }
            Ok(Frame::Terminate) => {
                shutdown.trigger(ShutdownReason::Terminator);
                return CloseReason::Terminated;
            }
            Err(e) => return CloseReason::Violation(e),
        }
    }
}

/// Read up to and including the next `\n`, at most [`MAX_FRAME_LEN`] bytes.
async fn read_frame<R>(reader: &mut BufReader<R>, frame: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    reader.take(MAX_FRAME_LEN as u64).read_until(b'\n', frame).await
}
