//! WebSocket session bridge.
//!
//! # Responsibilities
//! - Complete the upgrade for paths bound to a `SessionHandler`
//! - Feed inbound frames to the handler and send its replies
//! - Record session and message events
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ bridge ←──── SessionMessage ────→ SessionHandler
//!                                        └──→ WebSocketStatistics
//! ```
//!
//! # Design Decisions
//! - One task per session, messages handled in arrival order
//! - Ping/pong is answered by the transport and not counted
//! - A session keeps the handler it was opened with across redeploys

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use std::sync::Arc;
use uuid::Uuid;

use crate::dispatch::{SessionHandler, SessionMessage};
use crate::observability::metrics;
use crate::statistics::{WebSocketStatistics, WsEvent};

/// Everything a session needs once the upgrade completes.
pub struct SessionContext {
    pub application: Arc<str>,
    pub path: String,
    pub handler: Arc<dyn SessionHandler>,
    pub stats: Arc<WebSocketStatistics>,
}

/// Answer the upgrade and run the session in the background.
pub fn upgrade(upgrade: WebSocketUpgrade, context: SessionContext) -> axum::response::Response {
    upgrade.on_upgrade(move |socket| run_session(socket, context))
}

async fn run_session(mut socket: WebSocket, context: SessionContext) {
    let session_id = Uuid::new_v4();
    let SessionContext {
        application,
        path,
        handler,
        stats,
    } = context;

    stats.record(WsEvent::SessionOpened);
    metrics::record_ws_event("open");
    tracing::info!(
        session_id = %session_id,
        application = %application,
        path = %path,
        "WebSocket session opened"
    );

    let mut open = true;
    if let Some(greeting) = handler.on_open() {
        open = send(&mut socket, &stats, greeting).await;
    }

    while open {
        let message = match socket.recv().await {
            Some(Ok(Message::Text(text))) => SessionMessage::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => SessionMessage::Binary(data),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive failed");
                break;
            }
        };

        stats.record(WsEvent::MessageIn(message.len() as u64));
        metrics::record_ws_event("message_in");

        if let Some(reply) = handler.on_message(message).await {
            open = send(&mut socket, &stats, reply).await;
        }
    }

    handler.on_close();
    stats.record(WsEvent::SessionClosed);
    metrics::record_ws_event("close");
    tracing::info!(session_id = %session_id, application = %application, "WebSocket session closed");
}

/// Send one message; false once the peer is gone.
async fn send(
    socket: &mut WebSocket,
    stats: &WebSocketStatistics,
    message: SessionMessage,
) -> bool {
    let size = message.len() as u64;
    let frame = match message {
        SessionMessage::Text(text) => Message::Text(text.into()),
        SessionMessage::Binary(data) => Message::Binary(data),
    };
    match socket.send(frame).await {
        Ok(()) => {
            stats.record(WsEvent::MessageOut(size));
            metrics::record_ws_event("message_out");
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "WebSocket send failed");
            false
        }
    }
}
