//! Typed error definitions for numsrv.
//!
//! [`NumsrvError`] covers the process-level failures (startup, storage,
//! accept loop). [`FrameError`] describes why a single client frame was
//! rejected; it never leaves the connection that produced it.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Domain-specific errors for numsrv.
#[derive(Debug, Error)]
pub enum NumsrvError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The TCP listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// The number log could not be created or truncated.
    #[error("cannot create log file {}: {source}", path.display())]
    LogFile { path: PathBuf, source: io::Error },

    /// Writing or flushing the number log failed.
    #[error("log write failed: {0}")]
    LogWrite(#[source] io::Error),

    /// The listener failed outside of shutdown.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// Reasons a client frame is not a valid token.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Trimmed frame is not exactly the token length.
    #[error("frame must be {expected} bytes, received {actual}")]
    Length { expected: usize, actual: usize },

    /// Frame contains a byte outside `'0'..='9'`.
    #[error("frame contains non-digit byte 0x{0:02x}")]
    NonDigit(u8),

    /// No newline arrived within the frame size limit.
    #[error("frame exceeds {0} bytes without a newline")]
    TooLong(usize),
}
