//! Configuration for the number server.
//!
//! Settings come from three layers, later layers winning: built-in defaults,
//! an optional JSON config file, and command-line flags (applied by the
//! runner). Every key in the file is optional.
//!
//! # Example config
//!
//! ```json
//! {
//!   "host": "0.0.0.0",
//!   "port": 4000,
//!   "max": 5,
//!   "log": "/var/lib/numsrv/numbers.log",
//!   "report": "10s",
//!   "readTimeout": "30s",
//!   "channelCapacity": 1024
//! }
//! ```
//!
//! Durations are written as an integer with a unit suffix: `ms`, `s`, `m` or
//! `h` (e.g. `"500ms"`, `"2m"`).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Deserializer};

use crate::error::NumsrvError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_MAX_CLIENTS: usize = 5;
pub const DEFAULT_LOG_PATH: &str = "numbers.log";
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Effective server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address (IP or host name).
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Maximum simultaneously open client connections.
    pub max_clients: usize,
    /// Path of the number log, truncated at startup.
    pub log_path: PathBuf,
    /// Interval between statistics lines.
    pub report_interval: Duration,
    /// Idle time after which a client connection is closed.
    pub read_timeout: Duration,
    /// Capacity of the handler-to-aggregator channel.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            report_interval: DEFAULT_REPORT_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Overlay every key present in `file` onto `self`.
    pub fn merge(&mut self, file: FileConfig) {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(max) = file.max {
            self.max_clients = max;
        }
        if let Some(log) = file.log {
            self.log_path = log;
        }
        if let Some(report) = file.report {
            self.report_interval = report;
        }
        if let Some(timeout) = file.read_timeout {
            self.read_timeout = timeout;
        }
        if let Some(capacity) = file.channel_capacity {
            self.channel_capacity = capacity;
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), NumsrvError> {
        if self.max_clients == 0 {
            return Err(NumsrvError::Config("max must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(NumsrvError::Config("channelCapacity must be at least 1".into()));
        }
        if self.report_interval.is_zero() {
            return Err(NumsrvError::Config("report interval must be non-zero".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(NumsrvError::Config("readTimeout must be non-zero".into()));
        }
        Ok(())
    }

    /// `host:port` as used in log lines and bind errors.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Contents of a JSON config file. Absent keys keep the previous layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max: Option<usize>,
    pub log: Option<PathBuf>,
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub report: Option<Duration>,
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub read_timeout: Option<Duration>,
    pub channel_capacity: Option<usize>,
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Parse a duration such as `"250ms"`, `"10s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, NumsrvError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let n: u64 = number
        .parse()
        .map_err(|_| NumsrvError::Config(format!("invalid duration '{s}'")))?;

    let d = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        "" => return Err(NumsrvError::Config(format!("duration '{s}' is missing a unit (ms, s, m, h)"))),
        other => return Err(NumsrvError::Config(format!("unknown duration unit '{other}' in '{s}'"))),
    };
    Ok(d)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom)).transpose()
}
