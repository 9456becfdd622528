use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{nights_between, StayDetails, StayOption};

/// One room type a provider offers: the advertised nightly rate and the
/// nightly floor below which a counter-offer is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRate {
    pub room_type: String,
    pub price_per_night: f64,
    pub minimum_per_night: f64,
}

/// Static, read-only room catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCatalog {
    pub currency: String,
    rates: Vec<RoomRate>,
}

impl RoomCatalog {
    pub fn new(currency: impl Into<String>, rates: Vec<RoomRate>) -> Self {
        Self {
            currency: currency.into(),
            rates,
        }
    }

    pub fn rates(&self) -> &[RoomRate] {
        &self.rates
    }

    /// Price every room for the requested stay.
    pub fn quote(&self, details: &StayDetails) -> Result<Vec<StayOption>> {
        let nights = nights_between(details.check_in, details.check_out)?;
        Ok(self
            .rates
            .iter()
            .map(|rate| StayOption {
                room_type: rate.room_type.clone(),
                price_per_night: rate.price_per_night,
                total_nights: nights,
                total_price: rate.price_per_night * nights as f64,
                currency: self.currency.clone(),
            })
            .collect())
    }

    /// Lowest acceptable total for a room over the given number of nights.
    pub fn minimum_total(&self, room_type: &str, nights: i64) -> Option<f64> {
        self.rates
            .iter()
            .find(|rate| rate.room_type == room_type)
            .map(|rate| rate.minimum_per_night * nights as f64)
    }
}

impl Default for RoomCatalog {
    fn default() -> Self {
        DEFAULT_ROOM_CATALOG.clone()
    }
}

pub static DEFAULT_ROOM_CATALOG: Lazy<RoomCatalog> = Lazy::new(|| {
    RoomCatalog::new(
        "USD",
        vec![
            RoomRate {
                room_type: "standard".to_string(),
                price_per_night: 120.0,
                minimum_per_night: 95.0,
            },
            RoomRate {
                room_type: "deluxe".to_string(),
                price_per_night: 180.0,
                minimum_per_night: 150.0,
            },
            RoomRate {
                room_type: "suite".to_string(),
                price_per_night: 310.0,
                minimum_per_night: 260.0,
            },
        ],
    )
});

/// An insurance tier: premium is a fixed fraction of the trip cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageTier {
    pub name: String,
    pub coverage_percent: f64,
}

impl CoverageTier {
    pub fn premium_for(&self, trip_cost: f64) -> f64 {
        trip_cost * self.coverage_percent
    }
}

pub static DEFAULT_COVERAGE_TIERS: Lazy<Vec<CoverageTier>> = Lazy::new(|| {
    vec![
        CoverageTier {
            name: "basic".to_string(),
            coverage_percent: 0.05,
        },
        CoverageTier {
            name: "standard".to_string(),
            coverage_percent: 0.08,
        },
        CoverageTier {
            name: "comprehensive".to_string(),
            coverage_percent: 0.12,
        },
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn details(nights: u32) -> StayDetails {
        let check_in = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        StayDetails {
            destination: "Lisbon".to_string(),
            check_in,
            check_out: check_in + chrono::Duration::days(nights as i64),
            rooms: 1,
        }
    }

    #[test]
    fn test_quote_prices_every_room() {
        let catalog = RoomCatalog::new(
            "USD",
            vec![RoomRate {
                room_type: "standard".to_string(),
                price_per_night: 3.0,
                minimum_per_night: 2.0,
            }],
        );

        let options = catalog.quote(&details(2)).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].total_nights, 2);
        assert_eq!(options[0].total_price, 6.0);
    }

    #[test]
    fn test_minimum_total_scales_with_nights() {
        let catalog = RoomCatalog::new(
            "USD",
            vec![RoomRate {
                room_type: "standard".to_string(),
                price_per_night: 3.0,
                minimum_per_night: 2.0,
            }],
        );

        assert_eq!(catalog.minimum_total("standard", 2), Some(4.0));
        assert_eq!(catalog.minimum_total("penthouse", 2), None);
    }

    #[test]
    fn test_tier_premium() {
        let tier = CoverageTier {
            name: "basic".to_string(),
            coverage_percent: 0.05,
        };
        assert_eq!(tier.premium_for(200.0), 10.0);
    }
}
