//! Statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher (every completed/failed request)
//!     → http.rs (HttpOutcome → status class counters)
//! WebSocket bridge (open/close/message events)
//!     → websocket.rs (WsEvent → session counters)
//!
//! Both:
//!     → buckets.rs (minute-floored DashMap of atomic counter blocks)
//!     → get_entries(start, end) → gap-filled Vec, one entry per minute
//!
//! Retention sweeper (tokio task):
//!     every sweep interval → prune buckets older than the window
//! ```
//!
//! # Design Decisions
//! - At most one bucket per minute per stream, created lazily
//! - Per-bucket atomics instead of a global lock
//! - 3xx/1xx outcomes add duration and bytes but no status counter

pub mod buckets;
pub mod http;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use buckets::{floor_minute, now_millis, MINUTE_MS};
pub use http::{HttpOutcome, HttpStatistics, HttpStatsEntry, StatusClass};
pub use websocket::{WebSocketStatistics, WsEvent, WsStatsEntry};

/// Spawn a task pruning both aggregators until shutdown is signalled.
pub fn spawn_retention_sweeper(
    http: Arc<HttpStatistics>,
    websocket: Arc<WebSocketStatistics>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = now_millis();
                    let removed = http.prune(now) + websocket.prune(now);
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned expired statistics buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Statistics sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_retention_sweeper(
            Arc::new(HttpStatistics::new(Duration::from_secs(60))),
            Arc::new(WebSocketStatistics::new(Duration::from_secs(60))),
            Duration::from_millis(10),
            rx,
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
