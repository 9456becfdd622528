//! # Caravan - Agent-to-Agent Travel Negotiation
//!
//! A negotiation protocol for autonomous agents settling travel bookings
//! over a shared broadcast topic.
//!
//! ## Architecture
//!
//! - **Envelope**: typed message schema with canonical wire serialization
//! - **Channel**: append-only ordered pub/sub topic, in-process or via relay
//! - **Travel Agent**: requester that opens threads, accepts or counters
//!   offers, and triggers settlement
//! - **Hotel Agent**: provider that quotes its catalog and runs one
//!   negotiation round against a per-room floor
//! - **Insurance Agent**: secondary provider that observes acceptances and
//!   cross-sells coverage tiers
//! - **Settlement**: external value transfers with an append-only record
//! - **Bridge**: WebSocket adapter feeding a browser chat UI

pub mod bridge;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod insurance;
pub mod model;
pub mod provider;
pub mod relay;
pub mod requester;
pub mod runtime;
pub mod session;
pub mod settlement;

pub use catalog::{CoverageTier, RoomCatalog, RoomRate};
pub use channel::{Channel, EnvelopeFilter, InMemoryTopic, PublishReceipt, Subscription};
pub use config::AppConfig;
pub use envelope::{Envelope, MessageType, Sender, PROTOCOL_VERSION};
pub use error::{ProtocolError, Result};
pub use insurance::{InsuranceAgent, InsuranceAgentConfig};
pub use provider::{HotelAgent, HotelAgentConfig};
pub use relay::RelayChannel;
pub use requester::{TravelAgent, TravelAgentConfig};
pub use runtime::{run_role, AgentEvent, DelayStrategy, EventBus, RoleHandler};
pub use session::{SessionStore, ThreadState};
pub use settlement::{SettlementService, TransferRecord};

/// Correlation key linking every message in a negotiation thread back to the
/// originating request envelope.
pub type CorrelationId = uuid::Uuid;
