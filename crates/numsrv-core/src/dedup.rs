//! Lifetime deduplication set.
//!
//! Every value a client sends is checked against [`DedupSet`]. Only the
//! first occurrence is recorded; the set lives for the whole process and is
//! never persisted or reloaded.

use ahash::AHashSet;

/// Set of all values seen since process start.
///
/// # Thread safety
///
/// Not thread-safe. The aggregator task owns the only instance and every
/// other component reaches it through the aggregator's channel.
pub struct DedupSet {
    seen: AHashSet<u32>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self { seen: AHashSet::new() }
    }

    /// Record `value` if it has not been seen.
    ///
    /// Returns `true` on first sight, `false` for a duplicate. A duplicate
    /// leaves the set untouched.
    #[inline]
    pub fn insert(&mut self, value: u32) -> bool {
        self.seen.insert(value)
    }

    /// Number of distinct values seen so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new()
    }
}
