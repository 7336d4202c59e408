//! # numsrv
//!
//! Entry point for the deduplicating number server.
//!
//! Builds the effective configuration (defaults, optional JSON file, flags),
//! starts the server and waits for it to stop. The process exits with status
//! 0 after a graceful shutdown (terminator frame or Ctrl+C) and non-zero on
//! startup failures or a fatal log-write error.
//!
//! # Usage
//!
//! ```bash
//! numsrv --port 4000 --max 5 --log numbers.log --report 10s --read-timeout 30s
//! ```

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use numsrv_core::{
    config::{self, ServerConfig},
    shutdown::ShutdownReason,
};
use numsrv_server::Server;
use tracing::{info, warn};

/// Deduplicating TCP number server.
#[derive(Parser)]
#[command(name = "numsrv", about = "Deduplicating TCP number server")]
struct Cli {
    /// Optional configuration file (JSON). Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address.
    #[arg(long)]
    host: Option<String>,

    /// Bind port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent clients.
    #[arg(short, long)]
    max: Option<usize>,

    /// Number log path (truncated at startup).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Statistics interval, e.g. `10s`.
    #[arg(long, value_parser = parse_duration)]
    report: Option<Duration>,

    /// Per-connection idle timeout, e.g. `30s`.
    #[arg(long = "read-timeout", alias = "readTimeout", value_parser = parse_duration)]
    read_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional directory for diagnostic log files.
    #[arg(long)]
    log_dir: Option<String>,
}

impl Cli {
    /// Defaults, then the config file, then explicit flags.
    fn server_config(&self) -> Result<ServerConfig> {
        let mut cfg = ServerConfig::default();

        if let Some(path) = &self.config {
            cfg.merge(config::load_config(path)?);
        }

        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(max) = self.max {
            cfg.max_clients = max;
        }
        if let Some(log) = &self.log {
            cfg.log_path = log.clone();
        }
        if let Some(report) = self.report {
            cfg.report_interval = report;
        }
        if let Some(timeout) = self.read_timeout {
            cfg.read_timeout = timeout;
        }
        Ok(cfg)
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    config::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    numsrv_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "numsrv");

    // 2. Resolve configuration
    let cfg = cli.server_config()?;
    info!(
        "numsrv starting: addr={}, max={}, log={}, report={:?}, read_timeout={:?}",
        cfg.bind_addr(),
        cfg.max_clients,
        cfg.log_path.display(),
        cfg.report_interval,
        cfg.read_timeout,
    );

    // 3. Bind and create the log; failures here exit non-zero
    let server = Server::bind(cfg).await?;

    // 4. Ctrl+C takes the same graceful path as the terminator frame
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                if shutdown.trigger(ShutdownReason::Interrupt) {
                    info!("interrupt received, shutting down");
                }
            }
            Err(e) => warn!("cannot listen for Ctrl+C: {e}"),
        }
    });

    // 5. Serve until shutdown
    let summary = server.run().await?;
    info!(
        "numsrv stopped: {} unique number(s), {} duplicate(s)",
        summary.total, summary.duplicates,
    );
    Ok(())
}
