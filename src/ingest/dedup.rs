//! Message deduplication cache
//!
//! Tracks admitted message ids in insertion order. Admission and eviction
//! share one lock, so concurrent admits from the same batch cannot race an
//! eviction pass. Eviction runs at most once per interval and drops the
//! oldest half once the set exceeds its ceiling; a duplicate can therefore
//! slip through only after very high sustained volume or a long outage.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum time between eviction passes (1 hour)
const EVICTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Set size that triggers an eviction pass
const MAX_ENTRIES: usize = 5000;

#[derive(Debug)]
struct DedupInner {
    seen: HashSet<i64>,
    order: VecDeque<i64>,
    last_eviction: Instant,
}

/// Bounded, time-windowed message id cache
#[derive(Debug)]
pub struct MessageDedup {
    inner: Mutex<DedupInner>,
    eviction_interval: Duration,
    max_entries: usize,
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDedup {
    /// Create a cache with the standard interval and ceiling
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(EVICTION_INTERVAL, MAX_ENTRIES)
    }

    /// Create a cache with explicit limits
    #[must_use]
    pub fn with_limits(eviction_interval: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(DedupInner {
                seen: HashSet::new(),
                order: VecDeque::new(),
                last_eviction: Instant::now(),
            }),
            eviction_interval,
            max_entries,
        }
    }

    /// Admit a message id
    ///
    /// Returns `true` on the first admission within the retention window,
    /// `false` for a duplicate the caller must skip.
    pub fn admit(&self, message_id: i64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if inner.last_eviction.elapsed() >= self.eviction_interval {
            self.evict(&mut inner);
            inner.last_eviction = Instant::now();
        }

        if inner.seen.contains(&message_id) {
            return false;
        }

        inner.seen.insert(message_id);
        inner.order.push_back(message_id);
        true
    }

    /// Number of retained ids
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the oldest half when over the ceiling
    fn evict(&self, inner: &mut DedupInner) {
        if inner.order.len() <= self.max_entries {
            return;
        }

        let keep = inner.order.len() / 2;
        let drop_count = inner.order.len() - keep;
        for _ in 0..drop_count {
            if let Some(id) = inner.order.pop_front() {
                inner.seen.remove(&id);
            }
        }

        tracing::info!(kept = keep, dropped = drop_count, "dedup cache evicted oldest entries");
    }
}
