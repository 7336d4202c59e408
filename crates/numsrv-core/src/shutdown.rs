//! One-shot shutdown coordination.
//!
//! A single [`Shutdown`] handle is shared (cloned) by everything that may
//! request a stop: connection handlers seeing the terminator, the Ctrl+C
//! watcher, and the server when a fatal error occurs. Long-running tasks hold
//! a [`ShutdownSignal`] and await [`ShutdownSignal::cancelled`] at their
//! suspension points.
//!
//! The first trigger wins; later triggers are ignored, so the recorded
//! [`ShutdownReason`] is always the one that started the shutdown.

use std::{fmt, sync::Arc};

use tokio::sync::watch;

/// Why the shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A client sent the terminator frame.
    Terminator,
    /// The operator interrupted the process (Ctrl+C).
    Interrupt,
    /// A fatal error (log write, accept) stopped the service.
    Fatal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Terminator => "terminator received",
            Self::Interrupt => "interrupted",
            Self::Fatal => "fatal error",
        };
        f.write_str(s)
    }
}

/// Trigger side of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown.
    ///
    /// Returns `true` if this call started the shutdown, `false` if it had
    /// already been triggered.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(reason);
                true
            }
        })
    }

    /// The reason recorded by the first trigger, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Create a new observer of this shutdown.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered. Returns immediately if it
    /// already was.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` next to I/O. If every
    /// [`Shutdown`] handle is dropped nobody can trigger any more, which is
    /// treated as a shutdown.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(Option::is_some).await;
    }
}
