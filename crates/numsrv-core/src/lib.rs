//! # numsrv-core
//!
//! Core crate for the numsrv deduplicating number server, providing:
//!
//! - **Tokens** (`token`) — frame classification and 9-digit token parsing
//! - **Deduplication** (`dedup`) — the lifetime set of seen values
//! - **Statistics** (`stats`) — window counters and the periodic report line
//! - **Shutdown** (`shutdown`) — one-shot cancellation fanned out over `watch`
//! - **Configuration** (`config`) — defaults, JSON config file, validation
//! - **Error types** (`error`) — domain-specific `NumsrvError` via thiserror
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod stats;
pub mod token;

pub use error::{FrameError, NumsrvError};
