use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::channel::{Channel, EnvelopeFilter, InMemoryTopic, PublishReceipt, Subscription, TopicEntry};
use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Base64-encoded envelope bytes.
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireReceipt {
    pub sequence_number: u64,
    pub consensus_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireEntry {
    pub sequence_number: u64,
    pub consensus_timestamp: DateTime<Utc>,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub entries: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub since_seq: Option<u64>,
}

/// `Channel` implementation backed by a relay service, so role agents can
/// run as separate processes against one shared topic.
pub struct RelayChannel {
    endpoint: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl RelayChannel {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl Channel for RelayChannel {
    async fn publish(&self, envelope: &Envelope) -> Result<PublishReceipt> {
        let payload = general_purpose::STANDARD.encode(envelope.to_bytes()?);
        let response = self
            .client
            .post(format!("{}/topic/messages", self.endpoint))
            .json(&PublishRequest { payload })
            .send()
            .await
            .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProtocolError::ChannelUnavailable(format!(
                "relay returned {}",
                response.status()
            )));
        }

        let receipt: WireReceipt = response
            .json()
            .await
            .map_err(|e| ProtocolError::ChannelUnavailable(e.to_string()))?;
        Ok(PublishReceipt {
            sequence_number: receipt.sequence_number,
            consensus_timestamp: receipt.consensus_timestamp,
        })
    }

    async fn subscribe(&self, since: DateTime<Utc>, filter: EnvelopeFilter) -> Result<Subscription> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let mut last_seq = 0u64;
            loop {
                let poll = client
                    .get(format!("{}/topic/messages", endpoint))
                    .query(&[("since_seq", last_seq)])
                    .send()
                    .await;

                let response = match poll {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        // No retry: an unavailable relay ends the subscription.
                        tracing::error!("relay poll returned {}, closing subscription", response.status());
                        return;
                    }
                    Err(e) => {
                        tracing::error!("relay unreachable, closing subscription: {}", e);
                        return;
                    }
                };

                let body: PollResponse = match response.json().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::error!("relay poll body unreadable, closing subscription: {}", e);
                        return;
                    }
                };

                for entry in body.entries {
                    if entry.sequence_number <= last_seq {
                        continue;
                    }
                    last_seq = entry.sequence_number;
                    if entry.consensus_timestamp <= since {
                        continue;
                    }
                    let payload = match general_purpose::STANDARD.decode(&entry.payload) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::debug!(
                                sequence = entry.sequence_number,
                                "undecodable relay entry, skipping: {}",
                                e
                            );
                            continue;
                        }
                    };
                    let delivered = tx
                        .send(TopicEntry {
                            sequence_number: entry.sequence_number,
                            consensus_timestamp: entry.consensus_timestamp,
                            payload,
                        })
                        .await;
                    if delivered.is_err() {
                        return;
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
        });

        Ok(Subscription::new(rx, filter))
    }
}

#[derive(Clone)]
struct RelayState {
    topic: InMemoryTopic,
}

/// HTTP surface over a topic: publish, poll in order, health.
pub fn router(topic: InMemoryTopic) -> Router {
    Router::new()
        .route("/topic/messages", get(poll_messages).post(publish_message))
        .route("/health", get(health_check))
        .with_state(RelayState { topic })
}

async fn publish_message(
    State(state): State<RelayState>,
    Json(request): Json<PublishRequest>,
) -> Json<serde_json::Value> {
    let payload = match general_purpose::STANDARD.decode(&request.payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Json(serde_json::json!({
                "status": "error",
                "message": format!("payload is not base64: {}", e)
            }))
        }
    };

    match state.topic.publish_bytes(payload).await {
        Ok(receipt) => Json(serde_json::json!(WireReceipt {
            sequence_number: receipt.sequence_number,
            consensus_timestamp: receipt.consensus_timestamp,
        })),
        Err(e) => {
            tracing::error!("failed to append to topic: {}", e);
            Json(serde_json::json!({
                "status": "error",
                "message": e.to_string()
            }))
        }
    }
}

async fn poll_messages(
    State(state): State<RelayState>,
    Query(params): Query<PollParams>,
) -> Json<PollResponse> {
    let entries = state
        .topic
        .entries_after(params.since_seq.unwrap_or(0))
        .await
        .into_iter()
        .map(|entry| WireEntry {
            sequence_number: entry.sequence_number,
            consensus_timestamp: entry.consensus_timestamp,
            payload: general_purpose::STANDARD.encode(&entry.payload),
        })
        .collect();
    Json(PollResponse { entries })
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::envelope::MessageType;

    #[tokio::test]
    async fn test_publish_and_poll_round_trip() {
        let topic = InMemoryTopic::new();
        let app = router(topic.clone());

        let envelope = Envelope::new(MessageType::Request, json!({}), "a", "0.0.1");
        let payload = general_purpose::STANDARD.encode(envelope.to_bytes().unwrap());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/topic/messages")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&PublishRequest { payload }).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(topic.len().await, 1);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/topic/messages?since_seq=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: PollResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.entries.len(), 1);

        let decoded = general_purpose::STANDARD
            .decode(&body.entries[0].payload)
            .unwrap();
        let round_tripped = Envelope::from_bytes(&decoded).unwrap();
        assert_eq!(round_tripped.id, envelope.id);
    }

    #[tokio::test]
    async fn test_poll_skips_already_seen_entries() {
        let topic = InMemoryTopic::new();
        topic.publish_bytes(b"one".to_vec()).await.unwrap();
        topic.publish_bytes(b"two".to_vec()).await.unwrap();

        let app = router(topic);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/topic/messages?since_seq=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: PollResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.entries.len(), 1);
        assert_eq!(body.entries[0].sequence_number, 2);
    }
}
