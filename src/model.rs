use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Content of a `request` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelRequest {
    pub service: String,
    pub details: StayDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StayDetails {
    pub destination: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: u32,
}

/// Content of a `response` envelope listing availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub options: Vec<StayOption>,
    pub booking_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StayOption {
    pub room_type: String,
    pub price_per_night: f64,
    pub total_nights: i64,
    pub total_price: f64,
    pub currency: String,
}

/// Content of a `response` envelope confirming a paid booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmed {
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub booking_details: BookingDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetails {
    pub confirmation_number: String,
    pub total_paid: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Available,
    Confirmed,
}

/// Content of an `acceptance` envelope: the requester commits to one option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAcceptance {
    pub request_id: Uuid,
    pub booking_reference: String,
    pub room_type: String,
    pub total_price: f64,
    pub currency: String,
}

/// Content of a `negotiation` envelope sent by the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterOffer {
    pub request_id: Uuid,
    pub counter_offer: OfferTerms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferTerms {
    pub total_price: f64,
    pub currency: String,
}

/// Content of a `negotiation` envelope sent back by the provider.
///
/// `final_offer` is present when accepted, `minimum_price` when rejected.
/// There is no counter-counter-offer; one round only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationReply {
    pub request_id: Uuid,
    pub status: NegotiationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_offer: Option<OfferTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Accepted,
    Rejected,
}

/// Content of a `payment` envelope. A notice that a transfer was submitted,
/// not proof that it landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotice {
    pub request_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub recipient: String,
    pub description: String,
}

/// Content of an `insurance_offer` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceOffer {
    pub request_id: Uuid,
    pub trip_cost: f64,
    pub currency: String,
    pub tiers: Vec<InsuranceTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceTier {
    pub name: String,
    pub coverage_percent: f64,
    pub premium: f64,
}

/// Content of an `insurance_purchase` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsurancePurchase {
    pub request_id: Uuid,
    pub tier: String,
}

/// Content of an `insurance_declined` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceDeclined {
    pub request_id: Uuid,
}

/// Content of an `insurance_confirmed` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfirmation {
    pub request_id: Uuid,
    pub policy_number: String,
    pub tier: String,
    pub coverage_percent: f64,
    pub premium_paid: f64,
}

impl TravelRequest {
    pub fn validate(&self) -> Result<()> {
        if self.details.rooms == 0 {
            return Err(ProtocolError::Validation(
                "Rooms must be greater than 0".to_string(),
            ));
        }
        if self.details.check_in >= self.details.check_out {
            return Err(ProtocolError::Validation(
                "Check-in must be before check-out".to_string(),
            ));
        }
        if let Some(budget) = self.max_budget {
            if budget <= 0.0 {
                return Err(ProtocolError::Validation(
                    "Max budget must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Whole-day difference between two calendar dates.
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> Result<i64> {
    if check_in >= check_out {
        return Err(ProtocolError::Validation(
            "Check-in must be before check-out".to_string(),
        ));
    }
    Ok((check_out - check_in).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_nights_between() {
        assert_eq!(nights_between(date(2025, 6, 1), date(2025, 6, 3)).unwrap(), 2);
        assert_eq!(nights_between(date(2025, 6, 1), date(2025, 6, 2)).unwrap(), 1);
        // Spans a month boundary
        assert_eq!(
            nights_between(date(2025, 1, 30), date(2025, 2, 2)).unwrap(),
            3
        );
    }

    #[test]
    fn test_nights_between_rejects_inverted_range() {
        assert!(nights_between(date(2025, 6, 3), date(2025, 6, 1)).is_err());
        assert!(nights_between(date(2025, 6, 1), date(2025, 6, 1)).is_err());
    }

    #[test]
    fn test_travel_request_validation() {
        let mut request = TravelRequest {
            service: "hotel_booking".to_string(),
            details: StayDetails {
                destination: "Lisbon".to_string(),
                check_in: date(2025, 6, 1),
                check_out: date(2025, 6, 3),
                rooms: 1,
            },
            max_budget: Some(500.0),
        };
        assert!(request.validate().is_ok());

        request.details.rooms = 0;
        assert!(request.validate().is_err());

        request.details.rooms = 1;
        request.max_budget = Some(0.0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_negotiation_reply_wire_shape() {
        let rejected = NegotiationReply {
            request_id: Uuid::new_v4(),
            status: NegotiationStatus::Rejected,
            final_offer: None,
            minimum_price: Some(240.0),
        };

        let value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(value["status"], "rejected");
        assert_eq!(value["minimum_price"], 240.0);
        assert!(value.get("final_offer").is_none());
    }
}
