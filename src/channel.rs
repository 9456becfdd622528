use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::envelope::{Envelope, MessageType};
use crate::error::Result;

const FANOUT_CAPACITY: usize = 256;

/// Returned by `publish` once the topic has confirmed the append. Sending and
/// durable commit are one atomic step; there is no separate ack phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishReceipt {
    pub sequence_number: u64,
    pub consensus_timestamp: DateTime<Utc>,
}

/// One raw entry in the shared append-only log. The topic carries bytes; it
/// neither parses nor deduplicates what agents publish.
#[derive(Debug, Clone)]
pub struct TopicEntry {
    pub sequence_number: u64,
    pub consensus_timestamp: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// Declared subscription predicate. Roles state up front which message types
/// they observe instead of sniffing every envelope's content, and skip their
/// own broadcasts by account id.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeFilter {
    message_types: Option<Vec<MessageType>>,
    exclude_account: Option<String>,
}

impl EnvelopeFilter {
    /// Matches every well-formed envelope.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches only the given message types.
    pub fn message_types(types: &[MessageType]) -> Self {
        Self {
            message_types: Some(types.to_vec()),
            exclude_account: None,
        }
    }

    /// Additionally skip envelopes broadcast from the given account.
    pub fn not_from(mut self, account_id: impl Into<String>) -> Self {
        self.exclude_account = Some(account_id.into());
        self
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(types) = &self.message_types {
            if !types.contains(&envelope.message_type) {
                return false;
            }
        }
        if let Some(account) = &self.exclude_account {
            if &envelope.sender.account_id == account {
                return false;
            }
        }
        true
    }
}

/// The shared, ordered broadcast medium agents publish to and subscribe from.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Append an envelope to the topic. Does not return until the topic has
    /// confirmed the entry.
    async fn publish(&self, envelope: &Envelope) -> Result<PublishReceipt>;

    /// Stream envelopes appended after `since`, in channel-assigned order,
    /// restricted to the given filter. Delivery is at-least-once; malformed
    /// payloads on the wire are discarded without surfacing an error.
    async fn subscribe(&self, since: DateTime<Utc>, filter: EnvelopeFilter) -> Result<Subscription>;
}

/// An open subscription. `recv` yields the next matching envelope.
pub struct Subscription {
    rx: mpsc::Receiver<TopicEntry>,
    filter: EnvelopeFilter,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<TopicEntry>, filter: EnvelopeFilter) -> Self {
        Self { rx, filter }
    }

    /// Next matching envelope, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        while let Some(entry) = self.rx.recv().await {
            match Envelope::from_bytes(&entry.payload) {
                Ok(envelope) => {
                    if self.filter.matches(&envelope) {
                        return Some(envelope);
                    }
                }
                Err(e) => {
                    // Parse failures are swallowed, not surfaced.
                    tracing::debug!(
                        sequence = entry.sequence_number,
                        "discarding malformed envelope: {}",
                        e
                    );
                }
            }
        }
        None
    }
}

/// In-process topic: an append-only log with monotonically increasing
/// sequence numbers and a broadcast fan-out to live subscribers.
#[derive(Clone)]
pub struct InMemoryTopic {
    log: Arc<RwLock<Vec<TopicEntry>>>,
    fanout: broadcast::Sender<TopicEntry>,
}

impl InMemoryTopic {
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            fanout,
        }
    }

    /// Append raw bytes to the topic. The wire is byte-oriented: anything an
    /// agent hands over is committed as-is, well-formed or not.
    pub async fn publish_bytes(&self, payload: Vec<u8>) -> Result<PublishReceipt> {
        let mut log = self.log.write().await;
        let entry = TopicEntry {
            sequence_number: log.len() as u64 + 1,
            consensus_timestamp: Utc::now(),
            payload,
        };
        let receipt = PublishReceipt {
            sequence_number: entry.sequence_number,
            consensus_timestamp: entry.consensus_timestamp,
        };
        log.push(entry.clone());
        // No live subscribers is fine; the entry is in the log.
        let _ = self.fanout.send(entry);
        Ok(receipt)
    }

    /// Snapshot of every committed entry, in order.
    pub async fn entries(&self) -> Vec<TopicEntry> {
        self.log.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }

    /// Entries after `since`, for poll-based access (the relay uses this).
    pub async fn entries_after(&self, since_seq: u64) -> Vec<TopicEntry> {
        let log = self.log.read().await;
        log.iter()
            .filter(|entry| entry.sequence_number > since_seq)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for InMemoryTopic {
    async fn publish(&self, envelope: &Envelope) -> Result<PublishReceipt> {
        self.publish_bytes(envelope.to_bytes()?).await
    }

    async fn subscribe(&self, since: DateTime<Utc>, filter: EnvelopeFilter) -> Result<Subscription> {
        // Subscribe to the fan-out before snapshotting the log so nothing
        // published in between is lost; duplicates are dropped by sequence.
        let mut live = self.fanout.subscribe();
        let backlog = self.entries().await;

        let (tx, rx) = mpsc::channel(FANOUT_CAPACITY);
        tokio::spawn(async move {
            let mut last_seq = 0;
            for entry in backlog {
                if entry.consensus_timestamp <= since {
                    continue;
                }
                last_seq = entry.sequence_number;
                if tx.send(entry).await.is_err() {
                    return;
                }
            }
            loop {
                match live.recv().await {
                    Ok(entry) => {
                        if entry.sequence_number <= last_seq || entry.consensus_timestamp <= since
                        {
                            continue;
                        }
                        last_seq = entry.sequence_number;
                        if tx.send(entry).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("subscriber lagged, {} entries dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(Subscription::new(rx, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageType;
    use serde_json::json;

    fn envelope(message_type: MessageType, account: &str) -> Envelope {
        Envelope::new(message_type, json!({}), "test-agent", account)
    }

    #[tokio::test]
    async fn test_publish_assigns_increasing_sequence_numbers() {
        let topic = InMemoryTopic::new();
        let first = topic
            .publish(&envelope(MessageType::Request, "0.0.1001"))
            .await
            .unwrap();
        let second = topic
            .publish(&envelope(MessageType::Response, "0.0.1002"))
            .await
            .unwrap();

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_duplicate_publish_creates_two_entries() {
        let topic = InMemoryTopic::new();
        let env = envelope(MessageType::Payment, "0.0.1001");

        topic.publish(&env).await.unwrap();
        topic.publish(&env).await.unwrap();

        // No dedup anywhere: the same envelope lands twice.
        assert_eq!(topic.len().await, 2);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_in_order() {
        let topic = InMemoryTopic::new();
        let mut sub = topic
            .subscribe(DateTime::<Utc>::MIN_UTC, EnvelopeFilter::any())
            .await
            .unwrap();

        let first = envelope(MessageType::Request, "0.0.1001");
        let second = envelope(MessageType::Response, "0.0.1002");
        topic.publish(&first).await.unwrap();
        topic.publish(&second).await.unwrap();

        assert_eq!(sub.recv().await.unwrap().id, first.id);
        assert_eq!(sub.recv().await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_subscribe_replays_backlog_after_since() {
        let topic = InMemoryTopic::new();
        topic
            .publish(&envelope(MessageType::Request, "0.0.1001"))
            .await
            .unwrap();
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let late = envelope(MessageType::Response, "0.0.1002");
        topic.publish(&late).await.unwrap();

        let mut sub = topic
            .subscribe(cutoff, EnvelopeFilter::any())
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap().id, late.id);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_discarded_silently() {
        let topic = InMemoryTopic::new();
        let mut sub = topic
            .subscribe(DateTime::<Utc>::MIN_UTC, EnvelopeFilter::any())
            .await
            .unwrap();

        topic.publish_bytes(b"garbage".to_vec()).await.unwrap();
        let good = envelope(MessageType::Request, "0.0.1001");
        topic.publish(&good).await.unwrap();

        // The malformed entry is skipped; the next well-formed one arrives.
        assert_eq!(sub.recv().await.unwrap().id, good.id);
    }

    #[tokio::test]
    async fn test_filter_skips_own_broadcasts() {
        let topic = InMemoryTopic::new();
        let filter = EnvelopeFilter::any().not_from("0.0.1001");
        let mut sub = topic
            .subscribe(DateTime::<Utc>::MIN_UTC, filter)
            .await
            .unwrap();

        topic
            .publish(&envelope(MessageType::Request, "0.0.1001"))
            .await
            .unwrap();
        let other = envelope(MessageType::Request, "0.0.1002");
        topic.publish(&other).await.unwrap();

        assert_eq!(sub.recv().await.unwrap().id, other.id);
    }

    #[tokio::test]
    async fn test_filter_by_message_type() {
        let filter = EnvelopeFilter::message_types(&[MessageType::Acceptance]);
        assert!(filter.matches(&envelope(MessageType::Acceptance, "0.0.1001")));
        assert!(!filter.matches(&envelope(MessageType::Request, "0.0.1001")));
    }
}
