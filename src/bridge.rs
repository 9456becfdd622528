use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::runtime::EventBus;

/// Frame a browser client sends: `{"type": "input", "content": "..."}`.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    content: String,
}

#[derive(Clone)]
struct BridgeState {
    input_tx: mpsc::Sender<String>,
    events: EventBus,
}

/// WebSocket adapter over the core's public surface: inbound `input` frames
/// become submitted user requests, agent events stream out as
/// `{"sender", "content"}`. Presentation plumbing only.
pub fn router(input_tx: mpsc::Sender<String>, events: EventBus) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(BridgeState { input_tx, events })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    let (mut outbound, mut inbound) = socket.split();
    let mut events = state.events.subscribe();

    let forward_events = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    };
                    if outbound.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("chat client lagged, {} events dropped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    while let Some(Ok(message)) = inbound.next().await {
        if let Message::Text(text) = message {
            match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) if frame.kind == "input" => {
                    if state.input_tx.send(frame.content).await.is_err() {
                        break;
                    }
                }
                Ok(frame) => {
                    tracing::debug!(kind = %frame.kind, "ignoring non-input frame");
                }
                Err(e) => {
                    tracing::debug!("unparseable client frame, ignoring: {}", e);
                }
            }
        }
    }

    forward_events.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parsing() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type": "input", "content": "book a trip"}"#).unwrap();
        assert_eq!(frame.kind, "input");
        assert_eq!(frame.content, "book a trip");

        assert!(serde_json::from_str::<ClientFrame>(r#"{"content": "x"}"#).is_err());
    }
}
