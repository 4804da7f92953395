use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{GeoPoint, VehicleCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Superseded,
}

/// A time-boxed proposal of one trip to one driver. Carries everything the
/// driver app needs to render the offer without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOffer {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub driver_id: Uuid,
    pub rider_name: String,
    pub rider_phone: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub category: VehicleCategory,
    pub estimated_fare_cents: i64,
    pub net_payout_cents: i64,
    pub estimated_distance_miles: f64,
    pub estimated_duration_minutes: u32,
    pub pickup_eta_minutes: u32,
    pub special_instructions: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RideOffer {
    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }
}
