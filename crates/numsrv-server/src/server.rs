//! Server lifecycle: startup, accept loop, ordered shutdown.
//!
//! ```text
//! Server::bind()  ──► bind listener, create/truncate log file (fatal on error)
//! Server::run()   ──► spawn aggregator
//!                 ──► accept loop: one task per admitted connection
//!                 ──► shutdown: stop accepting ─► join connection tasks
//!                                              ─► aggregator drains + flushes
//! ```
//!
//! Any path that ends the service early (accept error, log write error)
//! triggers the shared [`Shutdown`] so the remaining tasks wind down the same
//! way they do for the terminator frame.

use std::{io, net::SocketAddr};

use anyhow::Result;
use numsrv_core::{
    NumsrvError,
    config::ServerConfig,
    shutdown::{Shutdown, ShutdownReason},
    token::ValidatedToken,
};
use tokio::{fs::File, sync::mpsc, task::JoinSet};
use tracing::{error, info, warn};

use crate::{
    aggregator::{Aggregator, AggregatorSummary},
    connection::{self, ConnectionContext},
    listener::{Accept, AdmissionListener},
};

pub struct Server {
    config: ServerConfig,
    listener: AdmissionListener,
    log_file: File,
    shutdown: Shutdown,
}

impl Server {
    /// Validate `config`, bind the listener and create the number log.
    ///
    /// Nothing is accepted until [`Server::run`] is called.
    pub async fn bind(config: ServerConfig) -> Result<Self, NumsrvError> {
        config.validate()?;

        let listener = AdmissionListener::bind(&config.host, config.port, config.max_clients).await?;

        let log_file = File::create(&config.log_path)
            .await
            .map_err(|source| NumsrvError::LogFile {
                path: config.log_path.clone(),
                source,
            })?;
        info!("[server] logging numbers to {}", config.log_path.display());

        Ok(Self {
            config,
            listener,
            log_file,
            shutdown: Shutdown::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the server from outside (e.g. Ctrl+C).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown, then return the aggregator's lifetime totals.
    ///
    /// Returns an error if the accept loop or the log writer failed; the log
    /// is still flushed as far as the writer allows.
    pub async fn run(self) -> Result<AggregatorSummary> {
        let Self { config, listener, log_file, shutdown } = self;

        let (tx, rx) = mpsc::channel::<ValidatedToken>(config.channel_capacity);

        let agg_shutdown = shutdown.clone();
        let agg_signal = shutdown.subscribe();
        let report_interval = config.report_interval;
        let aggregator = tokio::spawn(async move {
            let mut agg = Aggregator::new(log_file);
            let res = agg.run(rx, agg_signal, report_interval).await;
            if let Err(e) = &res {
                error!("[aggregator] {e}, stopping service");
                agg_shutdown.trigger(ShutdownReason::Fatal);
            }
            res
        });

        let ctx = ConnectionContext {
            tx,
            shutdown: shutdown.clone(),
            read_timeout: config.read_timeout,
        };

        info!(
            "[server] accepting on {}, max {} client(s)",
            config.bind_addr(),
            listener.max_clients(),
        );
        let mut handlers = JoinSet::new();
        let accepted = accept_loop(&listener, &ctx, &shutdown, &mut handlers).await;

        if let Err(e) = &accepted {
            error!("[server] {e}, stopping service");
            shutdown.trigger(ShutdownReason::Fatal);
        }
        drop(listener);
        // Connection tasks hold the remaining senders.
        drop(ctx);

        info!("[server] stopped accepting, waiting for {} connection(s)", handlers.len());
        while let Some(res) = handlers.join_next().await {
            if let Err(e) = res {
                warn!("[server] connection task failed: {e}");
            }
        }

        let summary = aggregator.await??;
        accepted?;

        match shutdown.reason() {
            Some(reason) => info!("[server] shut down ({reason})"),
            None => info!("[server] shut down"),
        }
        Ok(summary)
    }
}

async fn accept_loop(
    listener: &AdmissionListener,
    ctx: &ConnectionContext,
    shutdown: &Shutdown,
    handlers: &mut JoinSet<()>,
) -> Result<(), NumsrvError> {
    let mut signal = shutdown.subscribe();

    loop {
        let admitted = match listener.accept(&mut signal).await? {
            Accept::Admitted(a) => a,
            Accept::Closed => return Ok(()),
        };

        let peer = admitted.peer;
        let stream = admitted.stream;
        let permit = admitted.permit;
        let ctx = ctx.clone();
        info!("[conn {peer}] accepted ({} slot(s) left)", listener.available());

        handlers.spawn(async move {
            connection::handle_connection(stream, peer, ctx).await;
            drop(permit);
        });

        // Reap finished connections so the set only tracks live ones.
        while handlers.try_join_next().is_some() {}
    }
}
