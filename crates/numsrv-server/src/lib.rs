//! # numsrv-server
//!
//! TCP number server: accepts 9-digit tokens from many clients, logs each
//! distinct value once, and reports throughput per interval.
//!
//! ## Architecture
//!
//! ```text
//! AdmissionListener ──► connection tasks ──► mpsc (bounded) ──► Aggregator ──► log file
//!        ▲                     │                                    │
//!        └──── Shutdown ◄──────┘ "terminate"                        └──► stdout report
//! ```
//!
//! - [`listener`] — TCP accept bounded by a semaphore of client permits
//! - [`connection`] — per-client frame loop with a rolling read timeout
//! - [`aggregator`] — single owner of the dedup set, counters and log sink
//! - [`server`] — wires the above together and sequences shutdown

pub mod aggregator;
pub mod connection;
pub mod listener;
pub mod server;

pub use aggregator::{Aggregator, AggregatorSummary};
pub use server::Server;
