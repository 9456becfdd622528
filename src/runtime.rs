use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::channel::{Channel, EnvelopeFilter};
use crate::envelope::Envelope;
use crate::error::Result;

const EVENT_CAPACITY: usize = 64;

/// Pacing between receiving a message and replying. The source used wall
/// timers purely for demo effect; tests run with `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DelayStrategy {
    #[default]
    None,
    Fixed(Duration),
}

impl DelayStrategy {
    pub fn from_millis(millis: Option<u64>) -> Self {
        match millis {
            Some(ms) if ms > 0 => DelayStrategy::Fixed(Duration::from_millis(ms)),
            _ => DelayStrategy::None,
        }
    }

    pub async fn pause(&self) {
        if let DelayStrategy::Fixed(duration) = self {
            tokio::time::sleep(*duration).await;
        }
    }
}

/// Human-readable narration of what an agent just did, for the chat bridge
/// and the demo console.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub sender: String,
    pub content: String,
}

/// Broadcast fan-out for [`AgentEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, sender: impl Into<String>, content: impl Into<String>) {
        let event = AgentEvent {
            sender: sender.into(),
            content: content.into(),
        };
        tracing::info!(sender = %event.sender, "{}", event.content);
        // No listeners is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A role's reactive half: the subscription it declares and the handler the
/// runtime dispatches each inbound envelope to.
#[async_trait]
pub trait RoleHandler: Send {
    fn filter(&self) -> EnvelopeFilter;
    async fn handle(&mut self, envelope: Envelope) -> Result<()>;
}

/// Wire a handler to the channel and run it until the subscription closes.
///
/// Envelopes are dispatched one at a time; a handler is never invoked
/// concurrently with itself. Handler errors propagate to the caller.
pub async fn run_role<H: RoleHandler>(
    channel: Arc<dyn Channel>,
    since: DateTime<Utc>,
    mut handler: H,
) -> Result<()> {
    let mut subscription = channel.subscribe(since, handler.filter()).await?;
    while let Some(envelope) = subscription.recv().await {
        handler.handle(envelope).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryTopic;
    use crate::envelope::MessageType;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Recorder {
        seen: mpsc::UnboundedSender<Envelope>,
    }

    #[async_trait]
    impl RoleHandler for Recorder {
        fn filter(&self) -> EnvelopeFilter {
            EnvelopeFilter::message_types(&[MessageType::Request])
        }

        async fn handle(&mut self, envelope: Envelope) -> Result<()> {
            let _ = self.seen.send(envelope);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_role_dispatches_matching_envelopes() {
        let topic = Arc::new(InMemoryTopic::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let channel: Arc<dyn Channel> = topic.clone();
        tokio::spawn(run_role(
            channel,
            DateTime::<Utc>::MIN_UTC,
            Recorder { seen: tx },
        ));

        let request = Envelope::new(MessageType::Request, json!({}), "a", "0.0.1");
        topic.publish(&request).await.unwrap();
        topic
            .publish(&Envelope::new(MessageType::Payment, json!({}), "a", "0.0.1"))
            .await
            .unwrap();

        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.id, request.id);
        // The payment envelope never reaches the handler.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delay_strategy_from_millis() {
        assert_eq!(DelayStrategy::from_millis(None), DelayStrategy::None);
        assert_eq!(DelayStrategy::from_millis(Some(0)), DelayStrategy::None);
        assert_eq!(
            DelayStrategy::from_millis(Some(25)),
            DelayStrategy::Fixed(Duration::from_millis(25))
        );
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit("hotel-agent", "offer sent");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.sender, "hotel-agent");
        assert_eq!(event.content, "offer sent");
    }
}
