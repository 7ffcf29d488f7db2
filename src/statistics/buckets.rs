//! Minute-bucketed counter storage shared by the HTTP and WebSocket aggregators.
//!
//! Uses a sharded map of per-minute counter blocks; counters inside a block
//! are atomics so concurrent writers in the same minute never serialize on
//! the whole map.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Width of one statistics bucket in milliseconds.
pub const MINUTE_MS: u64 = 60_000;

/// Floor a millisecond timestamp to the start of its minute.
pub fn floor_minute(timestamp_ms: u64) -> u64 {
    timestamp_ms - timestamp_ms % MINUTE_MS
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A block of counters for one minute.
pub trait Counters: Default + Send + Sync + 'static {
    /// Value-type copy of the counters, stamped with its minute.
    type Snapshot;

    fn snapshot(&self, timestamp: u64) -> Self::Snapshot;

    /// Zero-valued snapshot for a minute with no activity.
    fn empty(timestamp: u64) -> Self::Snapshot;
}

/// Map of minute → counters with a retention window.
pub struct MinuteBuckets<C: Counters> {
    buckets: DashMap<u64, Arc<C>>,
    retention: Duration,
}

impl<C: Counters> MinuteBuckets<C> {
    pub fn new(retention: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Oldest minute still retained relative to `now_ms`.
    pub fn oldest_allowed(&self, now_ms: u64) -> u64 {
        floor_minute(now_ms.saturating_sub(self.retention.as_millis() as u64))
    }

    /// Counters for the minute containing `timestamp_ms`, created on first use.
    ///
    /// Returns `None` when the minute already fell out of the retention window.
    pub fn bucket(&self, timestamp_ms: u64) -> Option<Arc<C>> {
        let minute = floor_minute(timestamp_ms);
        if minute < self.oldest_allowed(now_millis()) {
            return None;
        }
        if let Some(existing) = self.buckets.get(&minute) {
            return Some(Arc::clone(existing.value()));
        }
        // entry() holds the shard lock, so racing first writers share one block
        let counters = self.buckets.entry(minute).or_default();
        Some(Arc::clone(counters.value()))
    }

    /// One snapshot per minute from `floor(start)` to `floor(end)` inclusive.
    pub fn entries(&self, start_ms: u64, end_ms: u64) -> Vec<C::Snapshot> {
        if end_ms < start_ms {
            return Vec::new();
        }
        let first = floor_minute(start_ms);
        let last = floor_minute(end_ms);
        let len = ((last - first) / MINUTE_MS + 1) as usize;

        let mut entries = Vec::with_capacity(len);
        let mut minute = first;
        while minute <= last {
            let snapshot = match self.buckets.get(&minute) {
                Some(counters) => counters.snapshot(minute),
                None => C::empty(minute),
            };
            entries.push(snapshot);
            minute += MINUTE_MS;
        }
        entries
    }

    /// Drop buckets older than the retention window. Returns the number removed.
    pub fn prune(&self, now_ms: u64) -> usize {
        let oldest = self.oldest_allowed(now_ms);
        let before = self.buckets.len();
        self.buckets.retain(|minute, _| *minute >= oldest);
        before - self.buckets.len()
    }

    /// Number of minutes currently holding counters.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
