use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::CoverageTier;
use crate::channel::{Channel, EnvelopeFilter};
use crate::envelope::{Envelope, MessageType};
use crate::error::Result;
use crate::model::{
    BookingAcceptance, InsuranceDeclined, InsuranceOffer, InsurancePurchase, InsuranceTier,
    PolicyConfirmation,
};
use crate::runtime::{DelayStrategy, EventBus, RoleHandler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceAgentConfig {
    pub agent_id: String,
    pub account_id: String,
}

#[derive(Debug, Clone)]
struct OfferedPolicy {
    trip_cost: f64,
    purchased: bool,
}

/// The secondary-provider role. It never receives a direct request: its
/// subscription declares that it observes `acceptance` envelopes on the
/// shared channel, and it cross-sells coverage against the accepted trip
/// cost.
pub struct InsuranceAgent {
    config: InsuranceAgentConfig,
    tiers: Vec<CoverageTier>,
    channel: Arc<dyn Channel>,
    events: EventBus,
    delay: DelayStrategy,
    offers: HashMap<Uuid, OfferedPolicy>,
}

impl InsuranceAgent {
    pub fn new(
        config: InsuranceAgentConfig,
        tiers: Vec<CoverageTier>,
        channel: Arc<dyn Channel>,
        events: EventBus,
        delay: DelayStrategy,
    ) -> Self {
        Self {
            config,
            tiers,
            channel,
            events,
            delay,
            offers: HashMap::new(),
        }
    }

    fn envelope(&self, message_type: MessageType, content: &impl Serialize) -> Result<Envelope> {
        Ok(Envelope::new(
            message_type,
            serde_json::to_value(content)?,
            &self.config.agent_id,
            &self.config.account_id,
        ))
    }

    async fn on_acceptance(&mut self, acceptance: BookingAcceptance) -> Result<()> {
        let request_id = acceptance.request_id;
        if self.offers.contains_key(&request_id) {
            tracing::debug!(%request_id, "already offered coverage for this trip");
            return Ok(());
        }

        let trip_cost = acceptance.total_price;
        let tiers: Vec<InsuranceTier> = self
            .tiers
            .iter()
            .map(|tier| InsuranceTier {
                name: tier.name.clone(),
                coverage_percent: tier.coverage_percent,
                premium: tier.premium_for(trip_cost),
            })
            .collect();

        self.offers.insert(
            request_id,
            OfferedPolicy {
                trip_cost,
                purchased: false,
            },
        );

        self.delay.pause().await;
        let offer = InsuranceOffer {
            request_id,
            trip_cost,
            currency: acceptance.currency,
            tiers,
        };
        let envelope = self.envelope(MessageType::InsuranceOffer, &offer)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Offered {} coverage tier(s) against a {} trip",
                offer.tiers.len(),
                trip_cost
            ),
        );
        Ok(())
    }

    /// Issue the policy on the purchase message alone; settlement of the
    /// premium is never verified here.
    async fn on_purchase(&mut self, purchase: InsurancePurchase) -> Result<()> {
        let request_id = purchase.request_id;
        let Some(offered) = self.offers.get_mut(&request_id) else {
            tracing::debug!(%request_id, "purchase for unknown offer, ignoring");
            return Ok(());
        };
        if offered.purchased {
            tracing::warn!(%request_id, "policy already issued, ignoring");
            return Ok(());
        }
        let Some(tier) = self.tiers.iter().find(|tier| tier.name == purchase.tier) else {
            tracing::warn!(tier = %purchase.tier, "unknown coverage tier, ignoring");
            return Ok(());
        };

        offered.purchased = true;
        let premium = tier.premium_for(offered.trip_cost);

        self.delay.pause().await;
        let policy_number = format!("POL-{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let confirmation = PolicyConfirmation {
            request_id,
            policy_number: policy_number.clone(),
            tier: tier.name.clone(),
            coverage_percent: tier.coverage_percent,
            premium_paid: premium,
        };
        let envelope = self.envelope(MessageType::InsuranceConfirmed, &confirmation)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!("Issued policy {} ({} tier)", policy_number, tier.name),
        );
        Ok(())
    }

    fn on_declined(&mut self, declined: InsuranceDeclined) {
        if self.offers.remove(&declined.request_id).is_some() {
            self.events
                .emit(&self.config.agent_id, "Coverage declined, closing offer");
        }
    }
}

#[async_trait]
impl RoleHandler for InsuranceAgent {
    fn filter(&self) -> EnvelopeFilter {
        EnvelopeFilter::message_types(&[
            MessageType::Acceptance,
            MessageType::InsurancePurchase,
            MessageType::InsuranceDeclined,
        ])
        .not_from(&self.config.account_id)
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<()> {
        match envelope.message_type {
            MessageType::Acceptance => match envelope.content_as::<BookingAcceptance>() {
                Ok(acceptance) => self.on_acceptance(acceptance).await,
                Err(e) => {
                    tracing::debug!("unparseable acceptance content, ignoring: {}", e);
                    Ok(())
                }
            },
            MessageType::InsurancePurchase => match envelope.content_as::<InsurancePurchase>() {
                Ok(purchase) => self.on_purchase(purchase).await,
                Err(_) => Ok(()),
            },
            MessageType::InsuranceDeclined => {
                if let Ok(declined) = envelope.content_as::<InsuranceDeclined>() {
                    self.on_declined(declined);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
