//! WebSocket stream of job events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use reelpress_core::JobEvent;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between heartbeats on an otherwise quiet connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Server heartbeat, sent periodically to keep the connection alive.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "heartbeat")]
pub struct Heartbeat {
    pub timestamp: i64,
}

/// Message sent to clients: a job event, or a heartbeat.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WsMessage {
    Event(JobEvent),
    Heartbeat(Heartbeat),
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::Event(JobEvent::Started { .. }) => "started",
            WsMessage::Event(JobEvent::Progress { .. }) => "progress",
            WsMessage::Event(JobEvent::Retrying { .. }) => "retrying",
            WsMessage::Event(JobEvent::Outcome { .. }) => "outcome",
            WsMessage::Heartbeat(_) => "heartbeat",
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.events().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            let msg = tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => WsMessage::Event(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Progress is advisory; the client catches up on the next event
                        warn!("WebSocket client lagged, skipped {} events", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat(Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                }),
            };

            WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize WsMessage: {}", e);
                }
            }
        }
    });

    // Drain client frames until close; pongs are handled by axum
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text.as_str());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelpress_core::{FailureClass, JobOutcome};

    #[test]
    fn test_event_serializes_flat() {
        let msg = WsMessage::Event(JobEvent::Progress {
            job_id: "a".to_string(),
            progress_percent: 40,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["job_id"], "a");
        assert_eq!(json["progress_percent"], 40);
        assert_eq!(msg.kind(), "progress");
    }

    #[test]
    fn test_outcome_event_carries_status() {
        let msg = WsMessage::Event(JobEvent::Outcome {
            outcome: JobOutcome::Failed {
                job_id: "a".to_string(),
                reason: "Input not found: /in/a.mov".to_string(),
                failure_class: FailureClass::Input,
            },
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "outcome");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["failure_class"], "input");
    }

    #[test]
    fn test_heartbeat_serialization() {
        let msg = WsMessage::Heartbeat(Heartbeat { timestamp: 1700000000 });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["timestamp"], 1700000000);
    }
}
