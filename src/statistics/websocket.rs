//! Per-minute WebSocket session statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::statistics::buckets::{now_millis, Counters, MinuteBuckets};

/// One WebSocket session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsEvent {
    SessionOpened,
    SessionClosed,
    /// Message received from the client, with its payload size.
    MessageIn(u64),
    /// Message sent to the client, with its payload size.
    MessageOut(u64),
}

#[derive(Default)]
pub struct WsCounters {
    new_sessions: AtomicU64,
    closed_sessions: AtomicU64,
    incoming_messages: AtomicU64,
    outgoing_messages: AtomicU64,
    incoming_bytes: AtomicU64,
    outgoing_bytes: AtomicU64,
}

impl WsCounters {
    fn add(&self, event: WsEvent) {
        match event {
            WsEvent::SessionOpened => {
                self.new_sessions.fetch_add(1, Ordering::Relaxed);
            }
            WsEvent::SessionClosed => {
                self.closed_sessions.fetch_add(1, Ordering::Relaxed);
            }
            WsEvent::MessageIn(bytes) => {
                self.incoming_messages.fetch_add(1, Ordering::Relaxed);
                self.incoming_bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            WsEvent::MessageOut(bytes) => {
                self.outgoing_messages.fetch_add(1, Ordering::Relaxed);
                self.outgoing_bytes.fetch_add(bytes, Ordering::Relaxed);
            }
        }
    }
}

/// Snapshot of one minute of WebSocket activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsStatsEntry {
    pub timestamp: u64,
    pub num_new_sessions: u64,
    pub num_closed_sessions: u64,
    pub num_incoming_messages: u64,
    pub num_outgoing_messages: u64,
    pub sum_incoming_bytes: u64,
    pub sum_outgoing_bytes: u64,
}

impl WsStatsEntry {
    /// Zero-valued entry for a minute with no activity.
    pub fn empty(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

impl Counters for WsCounters {
    type Snapshot = WsStatsEntry;

    fn snapshot(&self, timestamp: u64) -> WsStatsEntry {
        WsStatsEntry {
            timestamp,
            num_new_sessions: self.new_sessions.load(Ordering::Relaxed),
            num_closed_sessions: self.closed_sessions.load(Ordering::Relaxed),
            num_incoming_messages: self.incoming_messages.load(Ordering::Relaxed),
            num_outgoing_messages: self.outgoing_messages.load(Ordering::Relaxed),
            sum_incoming_bytes: self.incoming_bytes.load(Ordering::Relaxed),
            sum_outgoing_bytes: self.outgoing_bytes.load(Ordering::Relaxed),
        }
    }

    fn empty(timestamp: u64) -> WsStatsEntry {
        WsStatsEntry::empty(timestamp)
    }
}

/// Aggregates WebSocket session events into minute buckets.
pub struct WebSocketStatistics {
    buckets: MinuteBuckets<WsCounters>,
}

impl WebSocketStatistics {
    pub fn new(retention: Duration) -> Self {
        Self {
            buckets: MinuteBuckets::new(retention),
        }
    }

    pub fn record(&self, event: WsEvent) {
        self.record_at(now_millis(), event);
    }

    pub fn record_at(&self, timestamp_ms: u64, event: WsEvent) {
        match self.buckets.bucket(timestamp_ms) {
            Some(counters) => counters.add(event),
            None => tracing::debug!(timestamp_ms, "Dropping session event outside retention"),
        }
    }

    pub fn get_entries(&self, start_ms: u64, end_ms: u64) -> Vec<WsStatsEntry> {
        self.buckets.entries(start_ms, end_ms)
    }

    pub fn prune(&self, now_ms: u64) -> usize {
        self.buckets.prune(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::buckets::{floor_minute, MINUTE_MS};

    #[test]
    fn test_session_lifecycle_counts() {
        let stats = WebSocketStatistics::new(Duration::from_secs(3600));
        let minute = floor_minute(now_millis());

        stats.record_at(minute, WsEvent::SessionOpened);
        stats.record_at(minute + 1, WsEvent::MessageIn(12));
        stats.record_at(minute + 2, WsEvent::MessageOut(30));
        stats.record_at(minute + 3, WsEvent::MessageOut(5));
        stats.record_at(minute + MINUTE_MS, WsEvent::SessionClosed);

        let entries = stats.get_entries(minute - MINUTE_MS, minute + MINUTE_MS);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], WsStatsEntry::empty(minute - MINUTE_MS));
        assert_eq!(
            entries[1],
            WsStatsEntry {
                timestamp: minute,
                num_new_sessions: 1,
                num_closed_sessions: 0,
                num_incoming_messages: 1,
                num_outgoing_messages: 2,
                sum_incoming_bytes: 12,
                sum_outgoing_bytes: 35,
            }
        );
        assert_eq!(entries[2].num_closed_sessions, 1);
    }
}
