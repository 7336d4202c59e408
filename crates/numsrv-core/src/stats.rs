//! Windowed throughput statistics.
//!
//! The aggregator counts unique and duplicate tokens per reporting window.
//! At every tick the window is taken as a [`WindowReport`] and the counters
//! go back to zero. The distinct-value total comes from the dedup set and is
//! never reset.

use std::fmt;

/// Forward-only counters for the current reporting window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounters {
    unique: u64,
    duplicates: u64,
}

impl WindowCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_unique(&mut self) {
        self.unique += 1;
    }

    #[inline]
    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    /// Close the window: snapshot the counters together with the lifetime
    /// `total`, then reset both counters to zero.
    pub fn take(&mut self, total: usize) -> WindowReport {
        let report = WindowReport {
            unique: self.unique,
            duplicates: self.duplicates,
            total,
        };
        *self = Self::default();
        report
    }
}

/// One closed reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReport {
    pub unique: u64,
    pub duplicates: u64,
    /// Distinct values seen since process start.
    pub total: usize,
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.unique, self.duplicates, self.total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_resets_window() {
        let mut w = WindowCounters::new();
        w.record_unique();
        w.record_duplicate();
        w.record_duplicate();

        let r = w.take(7);
        assert_eq!(r, WindowReport { unique: 1, duplicates: 2, total: 7 });
        assert_eq!(w, WindowCounters::new());

        let r = w.take(7);
        assert_eq!(r, WindowReport { unique: 0, duplicates: 0, total: 7 });
    }

    #[test]
    fn report_line_format() {
        let r = WindowReport { unique: 3, duplicates: 1, total: 12 };
        assert_eq!(r.to_string(), "Received 3 unique numbers, 1 duplicates. Unique total: 12");
    }
}
