use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::channel::{Channel, EnvelopeFilter};
use crate::envelope::{Envelope, MessageType};
use crate::error::{ProtocolError, Result};
use crate::model::{
    BookingAcceptance, BookingConfirmed, BookingResponse, CounterOffer, InsuranceDeclined,
    InsuranceOffer, InsurancePurchase, NegotiationReply, NegotiationStatus, OfferTerms,
    PaymentNotice, PolicyConfirmation, StayDetails, StayOption, TravelRequest,
};
use crate::runtime::{EventBus, RoleHandler};
use crate::session::{SessionStore, ThreadState};
use crate::settlement::SettlementService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelAgentConfig {
    pub agent_id: String,
    pub account_id: String,
    /// Ceiling for a booking; offers above it are countered at exactly this
    /// amount.
    pub max_budget: f64,
    /// Tier to buy when an insurance offer arrives; `None` declines.
    pub insurance_tier: Option<String>,
}

/// What the requester remembers about one negotiation thread beyond its
/// state: who the provider is and which option is on the table.
#[derive(Debug, Clone)]
struct ThreadContext {
    provider_account: String,
    booking_reference: String,
    currency: String,
}

/// The requester role: opens negotiation threads, reacts to offers and
/// negotiation results, and triggers settlement.
pub struct TravelAgent {
    config: TravelAgentConfig,
    channel: Arc<dyn Channel>,
    settlement: SettlementService,
    events: EventBus,
    sessions: SessionStore,
    contexts: HashMap<Uuid, ThreadContext>,
}

impl TravelAgent {
    pub fn new(
        config: TravelAgentConfig,
        channel: Arc<dyn Channel>,
        settlement: SettlementService,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            channel,
            settlement,
            events,
            sessions: SessionStore::new(),
            contexts: HashMap::new(),
        }
    }

    /// Publish a travel request and open its negotiation thread. The request
    /// envelope's id is the thread's correlation id.
    pub async fn submit_request(&mut self, details: StayDetails) -> Result<Uuid> {
        let request = TravelRequest {
            service: "hotel_booking".to_string(),
            details,
            max_budget: Some(self.config.max_budget),
        };
        request.validate()?;

        let envelope = Envelope::new(
            MessageType::Request,
            serde_json::to_value(&request)?,
            &self.config.agent_id,
            &self.config.account_id,
        );
        self.sessions.open(envelope.id)?;
        self.channel.publish(&envelope).await?;

        self.events.emit(
            &self.config.agent_id,
            format!(
                "Requested {} in {} ({} to {})",
                request.service,
                request.details.destination,
                request.details.check_in,
                request.details.check_out
            ),
        );
        Ok(envelope.id)
    }

    pub fn thread_state(&self, correlation_id: Uuid) -> Option<ThreadState> {
        self.sessions.state(correlation_id)
    }

    pub fn active_threads(&self) -> Vec<Uuid> {
        self.sessions.active_threads()
    }

    fn publish_content(
        &self,
        message_type: MessageType,
        content: &impl Serialize,
    ) -> Result<Envelope> {
        Ok(Envelope::new(
            message_type,
            serde_json::to_value(content)?,
            &self.config.agent_id,
            &self.config.account_id,
        ))
    }

    async fn on_offer(&mut self, provider_account: String, response: BookingResponse) -> Result<()> {
        let request_id = response.request_id;
        if self.sessions.state(request_id) != Some(ThreadState::AwaitingOffer) {
            tracing::debug!(%request_id, "offer for a thread not awaiting one, ignoring");
            return Ok(());
        }

        let Some(cheapest) = response
            .options
            .iter()
            .min_by(|a, b| a.total_price.total_cmp(&b.total_price))
            .cloned()
        else {
            tracing::warn!(%request_id, "offer with no options, ignoring");
            return Ok(());
        };

        self.contexts.insert(
            request_id,
            ThreadContext {
                provider_account,
                booking_reference: response.booking_reference.clone(),
                currency: cheapest.currency.clone(),
            },
        );

        if cheapest.total_price <= self.config.max_budget {
            self.accept_offer(request_id, &response.booking_reference, &cheapest)
                .await
        } else {
            self.counter_offer(request_id, &cheapest).await
        }
    }

    async fn accept_offer(
        &mut self,
        request_id: Uuid,
        booking_reference: &str,
        option: &StayOption,
    ) -> Result<()> {
        let acceptance = BookingAcceptance {
            request_id,
            booking_reference: booking_reference.to_string(),
            room_type: option.room_type.clone(),
            total_price: option.total_price,
            currency: option.currency.clone(),
        };
        let envelope = self.publish_content(MessageType::Acceptance, &acceptance)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Accepted {} at {} {}",
                option.room_type, option.total_price, option.currency
            ),
        );

        self.settle_booking(request_id, option.total_price).await?;
        self.sessions
            .transition(request_id, ThreadState::AwaitingConfirmation)
    }

    async fn counter_offer(&mut self, request_id: Uuid, option: &StayOption) -> Result<()> {
        let counter = CounterOffer {
            request_id,
            counter_offer: OfferTerms {
                total_price: self.config.max_budget,
                currency: option.currency.clone(),
            },
        };
        let envelope = self.publish_content(MessageType::Negotiation, &counter)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Offered {} exceeds budget {}, countering at {}",
                option.total_price, self.config.max_budget, self.config.max_budget
            ),
        );
        self.sessions
            .transition(request_id, ThreadState::AwaitingNegotiationResult)
    }

    async fn on_negotiation_result(&mut self, reply: NegotiationReply) -> Result<()> {
        let request_id = reply.request_id;
        if self.sessions.state(request_id) != Some(ThreadState::AwaitingNegotiationResult) {
            tracing::debug!(%request_id, "negotiation reply for idle thread, ignoring");
            return Ok(());
        }

        match reply.status {
            NegotiationStatus::Accepted => {
                let agreed = reply
                    .final_offer
                    .map(|terms| terms.total_price)
                    .unwrap_or(self.config.max_budget);
                self.events.emit(
                    &self.config.agent_id,
                    format!("Counter-offer accepted at {}", agreed),
                );
                self.settle_booking(request_id, agreed).await?;
                self.sessions
                    .transition(request_id, ThreadState::AwaitingConfirmation)
            }
            NegotiationStatus::Rejected => {
                self.events.emit(
                    &self.config.agent_id,
                    format!(
                        "Counter-offer rejected, provider minimum is {}",
                        reply
                            .minimum_price
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    ),
                );
                // Terminal. Restarting takes a fresh request from the user.
                self.sessions.transition(request_id, ThreadState::Failed)
            }
        }
    }

    /// Publish the payment notice, then execute the transfer. The notice is
    /// what the provider confirms on; the transfer is what actually moves
    /// funds. Balance is checked in a separate call before transferring.
    async fn settle_booking(&mut self, request_id: Uuid, amount: f64) -> Result<()> {
        let context = self.contexts.get(&request_id).ok_or_else(|| {
            ProtocolError::Session(format!("no context for thread {}", request_id))
        })?;
        let recipient = context.provider_account.clone();
        let description = format!("Hotel booking {}", context.booking_reference);
        let currency = context.currency.clone();

        let notice = PaymentNotice {
            request_id,
            amount,
            currency,
            recipient: recipient.clone(),
            description: description.clone(),
        };
        let envelope = self.publish_content(MessageType::Payment, &notice)?;
        self.channel.publish(&envelope).await?;

        let available = self.settlement.balance(&self.config.account_id).await;
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        let transaction_id = self
            .settlement
            .transfer(&self.config.account_id, &recipient, amount, description)
            .await?;
        self.events.emit(
            &self.config.agent_id,
            format!("Paid {} ({})", amount, transaction_id),
        );
        Ok(())
    }

    async fn on_confirmation(&mut self, confirmed: BookingConfirmed) -> Result<()> {
        let request_id = confirmed.request_id;
        if self.sessions.state(request_id) != Some(ThreadState::AwaitingConfirmation) {
            tracing::debug!(%request_id, "confirmation for idle thread, ignoring");
            return Ok(());
        }
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Booking confirmed: {} ({} paid)",
                confirmed.booking_details.confirmation_number, confirmed.booking_details.total_paid
            ),
        );
        self.sessions.transition(request_id, ThreadState::Done)
    }

    async fn on_insurance_offer(
        &mut self,
        insurer_account: String,
        offer: InsuranceOffer,
    ) -> Result<()> {
        if !self.contexts.contains_key(&offer.request_id) {
            tracing::debug!(request_id = %offer.request_id, "insurance offer for unknown thread");
            return Ok(());
        }

        let chosen = self.config.insurance_tier.as_ref().and_then(|wanted| {
            offer.tiers.iter().find(|tier| &tier.name == wanted).cloned()
        });

        match chosen {
            Some(tier) => {
                let purchase = InsurancePurchase {
                    request_id: offer.request_id,
                    tier: tier.name.clone(),
                };
                let envelope = self.publish_content(MessageType::InsurancePurchase, &purchase)?;
                self.channel.publish(&envelope).await?;

                self.settlement
                    .transfer(
                        &self.config.account_id,
                        &insurer_account,
                        tier.premium,
                        format!("Trip insurance ({})", tier.name),
                    )
                    .await?;
                self.events.emit(
                    &self.config.agent_id,
                    format!("Purchased {} insurance for {}", tier.name, tier.premium),
                );
            }
            None => {
                let declined = InsuranceDeclined {
                    request_id: offer.request_id,
                };
                let envelope = self.publish_content(MessageType::InsuranceDeclined, &declined)?;
                self.channel.publish(&envelope).await?;
                self.events
                    .emit(&self.config.agent_id, "Declined trip insurance");
            }
        }
        Ok(())
    }

    fn on_policy(&mut self, policy: PolicyConfirmation) {
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Insurance policy {} issued ({} coverage, {} paid)",
                policy.policy_number, policy.coverage_percent, policy.premium_paid
            ),
        );
    }
}

#[async_trait]
impl RoleHandler for TravelAgent {
    fn filter(&self) -> EnvelopeFilter {
        EnvelopeFilter::message_types(&[
            MessageType::Response,
            MessageType::Negotiation,
            MessageType::InsuranceOffer,
            MessageType::InsuranceConfirmed,
        ])
        .not_from(&self.config.account_id)
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<()> {
        match envelope.message_type {
            MessageType::Response => {
                if let Ok(confirmed) = envelope.content_as::<BookingConfirmed>() {
                    self.on_confirmation(confirmed).await
                } else if let Ok(response) = envelope.content_as::<BookingResponse>() {
                    self.on_offer(envelope.sender.account_id, response).await
                } else {
                    tracing::debug!("response with unrecognized content, ignoring");
                    Ok(())
                }
            }
            MessageType::Negotiation => {
                // Other requesters' counter-offers share this message type;
                // only provider replies parse here.
                match envelope.content_as::<NegotiationReply>() {
                    Ok(reply) => self.on_negotiation_result(reply).await,
                    Err(_) => Ok(()),
                }
            }
            MessageType::InsuranceOffer => match envelope.content_as::<InsuranceOffer>() {
                Ok(offer) => {
                    self.on_insurance_offer(envelope.sender.account_id, offer)
                        .await
                }
                Err(_) => Ok(()),
            },
            MessageType::InsuranceConfirmed => {
                if let Ok(policy) = envelope.content_as::<PolicyConfirmation>() {
                    self.on_policy(policy);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
