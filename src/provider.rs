use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::RoomCatalog;
use crate::channel::{Channel, EnvelopeFilter};
use crate::envelope::{Envelope, MessageType};
use crate::error::Result;
use crate::model::{
    BookingConfirmed, BookingDetails, BookingResponse, CounterOffer, NegotiationReply,
    NegotiationStatus, PaymentNotice, ResponseStatus, TravelRequest,
};
use crate::runtime::{DelayStrategy, EventBus, RoleHandler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelAgentConfig {
    pub agent_id: String,
    pub account_id: String,
    /// Service name this provider answers requests for.
    pub service: String,
}

/// What the provider remembers about a quote it put on the table.
#[derive(Debug, Clone)]
struct QuotedStay {
    booking_reference: String,
    nights: i64,
    cheapest_room: String,
    negotiated: bool,
}

/// The provider role: quotes stays from its catalog, runs one negotiation
/// round against its per-room floor, and confirms bookings.
pub struct HotelAgent {
    config: HotelAgentConfig,
    catalog: RoomCatalog,
    channel: Arc<dyn Channel>,
    events: EventBus,
    delay: DelayStrategy,
    quotes: HashMap<Uuid, QuotedStay>,
}

impl HotelAgent {
    pub fn new(
        config: HotelAgentConfig,
        catalog: RoomCatalog,
        channel: Arc<dyn Channel>,
        events: EventBus,
        delay: DelayStrategy,
    ) -> Self {
        Self {
            config,
            catalog,
            channel,
            events,
            delay,
            quotes: HashMap::new(),
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

    async fn on_request(&mut self, request_id: Uuid, request: TravelRequest) -> Result<()> {
        if request.service != self.config.service {
            tracing::debug!(service = %request.service, "request for another service, ignoring");
            return Ok(());
        }
        if let Err(e) = request.validate() {
            tracing::warn!(%request_id, "invalid travel request, ignoring: {}", e);
            return Ok(());
        }

        let options = self.catalog.quote(&request.details)?;
        let Some(cheapest) = options
            .iter()
            .min_by(|a, b| a.total_price.total_cmp(&b.total_price))
        else {
            tracing::warn!(%request_id, "empty catalog, nothing to offer");
            return Ok(());
        };

        let booking_reference = format!("HB-{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.quotes.insert(
            request_id,
            QuotedStay {
                booking_reference: booking_reference.clone(),
                nights: cheapest.total_nights,
                cheapest_room: cheapest.room_type.clone(),
                negotiated: false,
            },
        );

        self.delay.pause().await;
        let response = BookingResponse {
            request_id,
            status: ResponseStatus::Available,
            options,
            booking_reference: booking_reference.clone(),
        };
        let envelope = self.envelope(MessageType::Response, &response)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Offered {} room option(s) for {} ({})",
                response.options.len(),
                request.details.destination,
                booking_reference
            ),
        );
        Ok(())
    }

    async fn on_counter_offer(&mut self, counter: CounterOffer) -> Result<()> {
        let request_id = counter.request_id;
        let Some(quote) = self.quotes.get_mut(&request_id) else {
            tracing::debug!(%request_id, "counter-offer for unknown quote, ignoring");
            return Ok(());
        };
        if quote.negotiated {
            // One round only; further counters fall on deaf ears.
            tracing::warn!(%request_id, "negotiation round already spent, ignoring");
            return Ok(());
        }
        quote.negotiated = true;

        let minimum = self
            .catalog
            .minimum_total(&quote.cheapest_room, quote.nights)
            .unwrap_or(0.0);
        let offered = counter.counter_offer.total_price;

        let reply = if offered >= minimum {
            NegotiationReply {
                request_id,
                status: NegotiationStatus::Accepted,
                final_offer: Some(counter.counter_offer.clone()),
                minimum_price: None,
            }
        } else {
            NegotiationReply {
                request_id,
                status: NegotiationStatus::Rejected,
                final_offer: None,
                minimum_price: Some(minimum),
            }
        };

        self.delay.pause().await;
        let envelope = self.envelope(MessageType::Negotiation, &reply)?;
        self.channel.publish(&envelope).await?;
        match reply.status {
            NegotiationStatus::Accepted => self.events.emit(
                &self.config.agent_id,
                format!("Accepted counter-offer of {}", offered),
            ),
            NegotiationStatus::Rejected => self.events.emit(
                &self.config.agent_id,
                format!("Rejected counter-offer of {}, minimum is {}", offered, minimum),
            ),
        }
        Ok(())
    }

    /// Confirm on the payment notice alone. Nothing here checks that a
    /// transfer actually landed for the right amount; the notice is trusted
    /// as-is.
    async fn on_payment(&mut self, notice: PaymentNotice) -> Result<()> {
        if notice.recipient != self.config.account_id {
            tracing::debug!("payment addressed to another account, ignoring");
            return Ok(());
        }
        let request_id = notice.request_id;
        let Some(quote) = self.quotes.get(&request_id) else {
            tracing::debug!(%request_id, "payment for unknown quote, ignoring");
            return Ok(());
        };
        let booking_reference = quote.booking_reference.clone();

        self.delay.pause().await;
        let confirmation_number = format!("CONF-{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let confirmed = BookingConfirmed {
            request_id,
            status: ResponseStatus::Confirmed,
            booking_details: BookingDetails {
                confirmation_number: confirmation_number.clone(),
                total_paid: notice.amount,
            },
        };
        let envelope = self.envelope(MessageType::Response, &confirmed)?;
        self.channel.publish(&envelope).await?;
        self.events.emit(
            &self.config.agent_id,
            format!(
                "Booking {} confirmed ({})",
                booking_reference, confirmation_number
            ),
        );
        Ok(())
    }
}

#[async_trait]
impl RoleHandler for HotelAgent {
    fn filter(&self) -> EnvelopeFilter {
        EnvelopeFilter::message_types(&[
            MessageType::Request,
            MessageType::Negotiation,
            MessageType::Payment,
        ])
        .not_from(&self.config.account_id)
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<()> {
        match envelope.message_type {
            MessageType::Request => match envelope.content_as::<TravelRequest>() {
                Ok(request) => self.on_request(envelope.id, request).await,
                Err(e) => {
                    tracing::debug!("unparseable request content, ignoring: {}", e);
                    Ok(())
                }
            },
            MessageType::Negotiation => match envelope.content_as::<CounterOffer>() {
                // Replies from other providers also ride this message type;
                // only counter-offers parse here.
                Ok(counter) => self.on_counter_offer(counter).await,
                Err(_) => Ok(()),
            },
            MessageType::Payment => match envelope.content_as::<PaymentNotice>() {
                Ok(notice) => self.on_payment(notice).await,
                Err(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
