use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Requested,
    Offered,
    Accepted,
    EnRoutePickup,
    ArrivedPickup,
    InProgress,
    Completed,
    Cancelled,
    NoDriversAvailable,
}

impl TripStatus {
    fn rank(self) -> Option<u8> {
        match self {
            TripStatus::Requested => Some(0),
            TripStatus::Offered => Some(1),
            TripStatus::Accepted => Some(2),
            TripStatus::EnRoutePickup => Some(3),
            TripStatus::ArrivedPickup => Some(4),
            TripStatus::InProgress => Some(5),
            TripStatus::Completed => Some(6),
            // Terminal side-exits, never part of the forward chain.
            TripStatus::Cancelled | TripStatus::NoDriversAvailable => None,
        }
    }

    /// Status order is monotonic: only the next step of the forward chain is
    /// allowed, plus `cancelled`/`no_drivers_available` out of
    /// `requested`/`offered`.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        match next {
            TripStatus::Cancelled | TripStatus::NoDriversAvailable => {
                matches!(self, TripStatus::Requested | TripStatus::Offered)
            }
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TripStatus::Completed | TripStatus::Cancelled | TripStatus::NoDriversAvailable
        )
    }
}

/// Committed fare recorded on a trip: total plus the fixed 80/20 split.
/// `net_payout_cents + commission_cents == fare_cents` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub fare_cents: i64,
    pub net_payout_cents: i64,
    pub commission_cents: i64,
    pub surge_multiplier: f64,
}

impl FareBreakdown {
    pub fn from_total(fare_cents: i64, surge_multiplier: f64) -> Self {
        let net_payout_cents = fare_cents * 80 / 100;
        Self {
            fare_cents,
            net_payout_cents,
            commission_cents: fare_cents - net_payout_cents,
            surge_multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub rider_id: String,
    pub rider_name: String,
    pub rider_phone: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub category: VehicleCategory,
    pub distance_miles: f64,
    pub fare: FareBreakdown,
    pub driver_id: Option<Uuid>,
    pub status: TripStatus,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ride request as handed to the dispatch coordinator.
#[derive(Debug, Clone)]
pub struct RideRequest {
    pub rider_id: String,
    pub rider_name: String,
    pub rider_phone: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub category: VehicleCategory,
    pub quote_id: Option<Uuid>,
    pub special_instructions: Option<String>,
}
