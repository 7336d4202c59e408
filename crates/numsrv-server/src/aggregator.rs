//! The aggregator: single owner of all dedup state.
//!
//! Connection tasks never touch the [`DedupSet`], the window counters or the
//! log sink. They push [`ValidatedToken`]s into a bounded mpsc channel and
//! this task applies them one at a time, so check-then-insert needs no lock.
//!
//! The loop services three event sources:
//!
//! ```text
//! rx.recv()      ──► dedup ──► first sight: append "<digits>\n" to sink
//! ticker.tick()  ──► print window report, reset window counters
//! shutdown       ──► drain rx until every sender is gone, flush once, return
//! ```
//!
//! A failed write to the sink ends the loop with [`NumsrvError::LogWrite`];
//! past that point the log can no longer be trusted to be complete.

use std::time::Duration;

use numsrv_core::{
    NumsrvError,
    dedup::DedupSet,
    shutdown::ShutdownSignal,
    stats::{WindowCounters, WindowReport},
    token::ValidatedToken,
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

/// Result of applying one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Unique,
    Duplicate,
}

/// Lifetime totals returned when the aggregator exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSummary {
    /// Distinct values logged.
    pub total: usize,
    /// Duplicate tokens discarded.
    pub duplicates: u64,
}

pub struct Aggregator<W> {
    seen: DedupSet,
    window: WindowCounters,
    duplicates_total: u64,
    sink: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> Aggregator<W> {
    /// Wrap `sink` in a default-sized write buffer.
    pub fn new(sink: W) -> Self {
        Self::from_buf(BufWriter::new(sink))
    }

    /// Wrap `sink` in a write buffer of `capacity` bytes.
    pub fn with_buffer_capacity(sink: W, capacity: usize) -> Self {
        Self::from_buf(BufWriter::with_capacity(capacity, sink))
    }

    fn from_buf(sink: BufWriter<W>) -> Self {
        Self {
            seen: DedupSet::new(),
            window: WindowCounters::new(),
            duplicates_total: 0,
            sink,
        }
    }

    /// Apply one token: count a duplicate, or record and log a new value.
    pub async fn ingest(&mut self, token: ValidatedToken) -> Result<Ingest, NumsrvError> {
        if !self.seen.insert(token.value()) {
            self.window.record_duplicate();
            self.duplicates_total += 1;
            return Ok(Ingest::Duplicate);
        }

        self.window.record_unique();
        self.sink.write_all(token.digits()).await.map_err(NumsrvError::LogWrite)?;
        self.sink.write_all(b"\n").await.map_err(NumsrvError::LogWrite)?;
        Ok(Ingest::Unique)
    }

    /// Close the current window and reset its counters.
    pub fn take_report(&mut self) -> WindowReport {
        self.window.take(self.seen.len())
    }

    pub fn summary(&self) -> AggregatorSummary {
        AggregatorSummary {
            total: self.seen.len(),
            duplicates: self.duplicates_total,
        }
    }

    /// Push buffered log lines through to the underlying writer.
    pub async fn flush(&mut self) -> Result<(), NumsrvError> {
        self.sink.flush().await.map_err(NumsrvError::LogWrite)
    }

    /// Give back the underlying writer. Unflushed bytes are discarded.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    /// Run the event loop until shutdown (or until every sender is dropped).
    ///
    /// After shutdown fires no more report ticks are serviced, but tokens that
    /// connection tasks still send are applied until the channel closes, then
    /// the sink is flushed once.
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ValidatedToken>,
        mut shutdown: ShutdownSignal,
        report_interval: Duration,
    ) -> Result<AggregatorSummary, NumsrvError> {
        let mut ticker = tokio::time::interval_at(Instant::now() + report_interval, report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("[aggregator] started, reporting every {report_interval:?}");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("[aggregator] shutdown observed, draining");
                    break;
                }
                _ = ticker.tick() => self.report(),
                msg = rx.recv() => match msg {
                    Some(token) => {
                        self.ingest(token).await?;
                    }
                    None => break,
                },
            }
        }

        while let Some(token) = rx.recv().await {
            self.ingest(token).await?;
        }

        self.flush().await?;

        let summary = self.summary();
        info!(
            "[aggregator] flushed and stopped: {} unique, {} duplicates",
            summary.total, summary.duplicates,
        );
        Ok(summary)
    }

    fn report(&mut self) {
        let report = self.take_report();
        println!("{report}");
        debug!("[aggregator] {report}");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use numsrv_core::shutdown::{Shutdown, ShutdownReason};

    use super::*;

    fn tok(s: &str) -> ValidatedToken {
        ValidatedToken::parse(s.as_bytes()).unwrap()
    }

    fn log_lines(buf: &[u8]) -> Vec<&str> {
        std::str::from_utf8(buf).unwrap().lines().collect()
    }

    /// Writer whose every write fails.
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn duplicates_are_logged_once() {
        let mut agg = Aggregator::new(Vec::new());
        assert_eq!(agg.ingest(tok("000000042")).await.unwrap(), Ingest::Unique);
        for _ in 0..5 {
            assert_eq!(agg.ingest(tok("000000042")).await.unwrap(), Ingest::Duplicate);
        }
        agg.flush().await.unwrap();

        assert_eq!(agg.summary(), AggregatorSummary { total: 1, duplicates: 5 });
        assert_eq!(log_lines(&agg.into_inner()), vec!["000000042"]);
    }

    #[tokio::test]
    async fn log_keeps_arrival_order_and_text() {
        let mut agg = Aggregator::new(Vec::new());
        for s in ["900000000", "000000001", "123456789", "000000001", "000000010"] {
            agg.ingest(tok(s)).await.unwrap();
        }
        agg.flush().await.unwrap();
        assert_eq!(
            log_lines(&agg.into_inner()),
            vec!["900000000", "000000001", "123456789", "000000010"]
        );
    }

    #[tokio::test]
    async fn window_resets_but_total_persists() {
        let mut agg = Aggregator::new(Vec::new());
        agg.ingest(tok("000000001")).await.unwrap();
        agg.ingest(tok("000000001")).await.unwrap();

        let first = agg.take_report();
        assert_eq!(first, WindowReport { unique: 1, duplicates: 1, total: 1 });

        let second = agg.take_report();
        assert_eq!(second, WindowReport { unique: 0, duplicates: 0, total: 1 });

        agg.ingest(tok("000000002")).await.unwrap();
        agg.ingest(tok("000000001")).await.unwrap();
        let third = agg.take_report();
        assert_eq!(third, WindowReport { unique: 1, duplicates: 1, total: 2 });
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let mut agg = Aggregator::with_buffer_capacity(BrokenSink, 0);
        let err = agg.ingest(tok("000000001")).await.unwrap_err();
        assert!(matches!(err, NumsrvError::LogWrite(_)));
    }

    #[tokio::test]
    async fn run_stops_on_write_failure() {
        let (tx, rx) = mpsc::channel(4);
        let shutdown = Shutdown::new();
        let mut agg = Aggregator::with_buffer_capacity(BrokenSink, 0);

        tx.send(tok("000000001")).await.unwrap();
        let res = agg.run(rx, shutdown.subscribe(), Duration::from_secs(60)).await;
        assert!(matches!(res, Err(NumsrvError::LogWrite(_))));
        // The receiver is gone with the failed run.
        assert!(tx.send(tok("000000002")).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_drains_queue_and_flushes() {
        let (tx, rx) = mpsc::channel(16);
        let shutdown = Shutdown::new();
        let mut agg = Aggregator::new(Vec::new());

        for s in ["000000003", "000000001", "000000003", "000000002"] {
            tx.send(tok(s)).await.unwrap();
        }
        shutdown.trigger(ShutdownReason::Terminator);

        let late = tx.clone();
        drop(tx);
        let sender = tokio::spawn(async move {
            // A connection finishing its current frame after shutdown.
            tokio::time::sleep(Duration::from_millis(20)).await;
            late.send(tok("000000004")).await.unwrap();
        });

        let summary = agg.run(rx, shutdown.subscribe(), Duration::from_secs(60)).await.unwrap();
        sender.await.unwrap();

        assert_eq!(summary, AggregatorSummary { total: 4, duplicates: 1 });
        assert_eq!(
            log_lines(&agg.into_inner()),
            vec!["000000003", "000000001", "000000002", "000000004"]
        );
    }

    #[tokio::test]
    async fn channel_close_ends_run() {
        let (tx, rx) = mpsc::channel(4);
        let shutdown = Shutdown::new();
        let mut agg = Aggregator::new(Vec::new());

        tx.send(tok("000000009")).await.unwrap();
        drop(tx);

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            agg.run(rx, shutdown.subscribe(), Duration::from_secs(60)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(log_lines(&agg.into_inner()), vec!["000000009"]);
    }

    #[tokio::test]
    async fn ticks_reset_the_window() {
        let (tx, rx) = mpsc::channel(4);
        let shutdown = Shutdown::new();
        let mut agg = Aggregator::new(Vec::new());

        let trigger = shutdown.clone();
        let driver = tokio::spawn(async move {
            tx.send(tok("000000001")).await.unwrap();
            tx.send(tok("000000001")).await.unwrap();
            // Several report intervals pass.
            tokio::time::sleep(Duration::from_millis(120)).await;
            trigger.trigger(ShutdownReason::Terminator);
        });

        agg.run(rx, shutdown.subscribe(), Duration::from_millis(20)).await.unwrap();
        driver.await.unwrap();

        // Window emptied by the ticks, lifetime totals intact.
        assert_eq!(agg.take_report(), WindowReport { unique: 0, duplicates: 0, total: 1 });
        assert_eq!(agg.summary(), AggregatorSummary { total: 1, duplicates: 1 });
    }
}
