//! Per-minute HTTP request statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::statistics::buckets::{now_millis, Counters, MinuteBuckets};

/// Outcome of one completed (or failed) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    pub duration: Duration,
    pub response_bytes: u64,
}

/// Status class tallied for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
    /// 1xx/3xx and out-of-range codes: not tallied in any counter.
    Other,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

#[derive(Default)]
pub struct HttpCounters {
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    duration_ms: AtomicU64,
    response_bytes: AtomicU64,
}

impl HttpCounters {
    fn add(&self, outcome: &HttpOutcome) {
        match StatusClass::of(outcome.status) {
            StatusClass::Success => self.success.fetch_add(1, Ordering::Relaxed),
            StatusClass::ClientError => self.client_errors.fetch_add(1, Ordering::Relaxed),
            StatusClass::ServerError => self.server_errors.fetch_add(1, Ordering::Relaxed),
            StatusClass::Other => 0,
        };
        self.duration_ms
            .fetch_add(outcome.duration.as_millis() as u64, Ordering::Relaxed);
        self.response_bytes
            .fetch_add(outcome.response_bytes, Ordering::Relaxed);
    }
}

/// Snapshot of one minute of HTTP activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpStatsEntry {
    /// Minute start, milliseconds since the epoch.
    pub timestamp: u64,
    pub num_success_requests: u64,
    pub num_client_error_requests: u64,
    pub num_server_error_requests: u64,
    /// Summed request duration in milliseconds.
    pub sum_requests_duration: u64,
    pub sum_response_bytes: u64,
}

impl HttpStatsEntry {
    /// Zero-valued entry for a minute with no activity.
    pub fn empty(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

impl Counters for HttpCounters {
    type Snapshot = HttpStatsEntry;

    fn snapshot(&self, timestamp: u64) -> HttpStatsEntry {
        HttpStatsEntry {
            timestamp,
            num_success_requests: self.success.load(Ordering::Relaxed),
            num_client_error_requests: self.client_errors.load(Ordering::Relaxed),
            num_server_error_requests: self.server_errors.load(Ordering::Relaxed),
            sum_requests_duration: self.duration_ms.load(Ordering::Relaxed),
            sum_response_bytes: self.response_bytes.load(Ordering::Relaxed),
        }
    }

    fn empty(timestamp: u64) -> HttpStatsEntry {
        HttpStatsEntry::empty(timestamp)
    }
}

/// Aggregates request outcomes into minute buckets.
pub struct HttpStatistics {
    buckets: MinuteBuckets<HttpCounters>,
}

impl HttpStatistics {
    pub fn new(retention: Duration) -> Self {
        Self {
            buckets: MinuteBuckets::new(retention),
        }
    }

    /// Record an outcome in the current minute.
    pub fn record(&self, outcome: HttpOutcome) {
        self.record_at(now_millis(), outcome);
    }

    /// Record an outcome in the minute containing `timestamp_ms`.
    pub fn record_at(&self, timestamp_ms: u64, outcome: HttpOutcome) {
        match self.buckets.bucket(timestamp_ms) {
            Some(counters) => counters.add(&outcome),
            None => tracing::debug!(timestamp_ms, "Dropping request outcome outside retention"),
        }
    }

    /// One entry per minute between `start_ms` and `end_ms`, zero-filled.
    pub fn get_entries(&self, start_ms: u64, end_ms: u64) -> Vec<HttpStatsEntry> {
        self.buckets.entries(start_ms, end_ms)
    }

    pub fn prune(&self, now_ms: u64) -> usize {
        self.buckets.prune(now_ms)
    }

    pub fn retention(&self) -> Duration {
        self.buckets.retention()
    }
}
