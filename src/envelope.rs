use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Version tag stamped on every outgoing envelope. Carried on the wire but
/// never validated on receipt; receivers stay permissive.
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Negotiation,
    Payment,
    Acceptance,
    InsuranceOffer,
    InsurancePurchase,
    InsuranceDeclined,
    InsuranceConfirmed,
}

/// Logical role name plus the external-ledger account it broadcasts from.
/// The `account_id` doubles as the key agents use to skip their own messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub agent_id: String,
    pub account_id: String,
}

/// The unit of communication between agents.
///
/// `content` is free-form; its shape is determined by `message_type` and the
/// typed structs in [`crate::model`]. No validation of content against the
/// message type happens here; callers are trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub protocol_version: String,
    pub message_type: MessageType,
    pub sender: Sender,
    pub content: serde_json::Value,
}

impl Envelope {
    pub fn new(
        message_type: MessageType,
        content: serde_json::Value,
        agent_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            message_type,
            sender: Sender {
                agent_id: agent_id.into(),
                account_id: account_id.into(),
            },
            content,
        }
    }

    /// Canonical wire serialization.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Reconstruct an envelope from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Deserialize the content into one of the typed shapes.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.content.clone())
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope::new(
            MessageType::Request,
            json!({"service": "hotel_booking", "max_budget": 500.0}),
            "travel-agent",
            "0.0.1001",
        );

        let bytes = envelope.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.message_type, envelope.message_type);
        assert_eq!(decoded.sender, envelope.sender);
        assert_eq!(decoded.content, envelope.content);
    }

    #[test]
    fn test_malformed_bytes_are_rejected() {
        let result = Envelope::from_bytes(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));

        // Well-formed JSON that is not an envelope is malformed too.
        let result = Envelope::from_bytes(br#"{"hello": "world"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_message_type_wire_names() {
        let envelope = Envelope::new(
            MessageType::InsuranceOffer,
            json!({}),
            "insurance-agent",
            "0.0.1003",
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["message_type"], "insurance_offer");
        assert_eq!(value["protocol_version"], PROTOCOL_VERSION);
    }
}
