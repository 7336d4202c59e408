//! Admission-limited TCP listener.
//!
//! A client permit is taken from a semaphore *before* calling `accept`, so
//! once `max` connections are open the next connection stays in the kernel
//! backlog until a permit is released. The permit travels with the accepted
//! stream and is returned when the connection task drops it.

use std::{io, net::SocketAddr, sync::Arc};

use numsrv_core::{NumsrvError, shutdown::ShutdownSignal};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tracing::info;

/// A connection that got past the admission limit.
pub struct Admitted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    /// Released on drop, freeing a slot for the next client.
    pub permit: OwnedSemaphorePermit,
}

/// Outcome of a single accept attempt.
pub enum Accept {
    Admitted(Admitted),
    /// Shutdown was triggered; the accept loop should stop.
    Closed,
}

pub struct AdmissionListener {
    listener: TcpListener,
    permits: Arc<Semaphore>,
    max_clients: usize,
}

impl AdmissionListener {
    /// Bind `host:port` and allow at most `max_clients` open connections.
    pub async fn bind(host: &str, port: u16, max_clients: usize) -> Result<Self, NumsrvError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| NumsrvError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;

        if let Ok(addr) = listener.local_addr() {
            info!("[listener] bound {addr}, max {max_clients} client(s)");
        }

        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(max_clients)),
            max_clients,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connections that can still be admitted right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Wait for a free permit, then for the next connection.
    ///
    /// Returns [`Accept::Closed`] as soon as `shutdown` fires, whichever of the
    /// two waits is in progress. Any accept error is returned as
    /// [`NumsrvError::Accept`] and ends the accept loop.
    pub async fn accept(&self, shutdown: &mut ShutdownSignal) -> Result<Accept, NumsrvError> {
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(Accept::Closed),
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                // The semaphore is never closed while the listener lives.
                Err(_) => return Ok(Accept::Closed),
            },
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Ok(Accept::Closed),
            res = self.listener.accept() => {
                let (stream, peer) = res.map_err(NumsrvError::Accept)?;
                Ok(Accept::Admitted(Admitted { stream, peer, permit }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use numsrv_core::shutdown::{Shutdown, ShutdownReason};

    use super::*;

    async fn admit(listener: &AdmissionListener, sig: &mut ShutdownSignal) -> Admitted {
        match tokio::time::timeout(Duration::from_secs(2), listener.accept(sig)).await {
            Ok(Ok(Accept::Admitted(a))) => a,
            Ok(Ok(Accept::Closed)) => panic!("listener closed unexpectedly"),
            Ok(Err(e)) => panic!("accept failed: {e}"),
            Err(_) => panic!("accept timed out"),
        }
    }

    #[tokio::test]
    async fn third_client_waits_for_a_permit() {
        let listener = AdmissionListener::bind("127.0.0.1", 0, 2).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let mut sig = shutdown.subscribe();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();
        let _c3 = TcpStream::connect(addr).await.unwrap();

        let first = admit(&listener, &mut sig).await;
        let _second = admit(&listener, &mut sig).await;
        assert_eq!(listener.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(150), listener.accept(&mut sig)).await;
        assert!(blocked.is_err(), "third connection admitted past the limit");

        drop(first);
        assert_eq!(listener.available(), 1);
        let third = admit(&listener, &mut sig).await;
        assert_eq!(listener.available(), 0);
        drop(third);
    }

    #[tokio::test]
    async fn shutdown_closes_pending_accept() {
        let listener = AdmissionListener::bind("127.0.0.1", 0, 1).await.unwrap();
        let shutdown = Shutdown::new();
        let mut sig = shutdown.subscribe();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger(ShutdownReason::Terminator);
        });

        let res = tokio::time::timeout(Duration::from_secs(2), listener.accept(&mut sig))
            .await
            .expect("accept did not observe shutdown");
        assert!(matches!(res, Ok(Accept::Closed)));
    }

    #[tokio::test]
    async fn shutdown_closes_while_waiting_for_permit() {
        let listener = AdmissionListener::bind("127.0.0.1", 0, 1).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let mut sig = shutdown.subscribe();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _held = admit(&listener, &mut sig).await;

        shutdown.trigger(ShutdownReason::Interrupt);
        let res = tokio::time::timeout(Duration::from_secs(2), listener.accept(&mut sig))
            .await
            .unwrap();
        assert!(matches!(res, Ok(Accept::Closed)));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = AdmissionListener::bind("127.0.0.1", 0, 1).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = AdmissionListener::bind("127.0.0.1", port, 1).await.err().unwrap();
        assert!(matches!(err, NumsrvError::Bind { .. }));
    }
}
