pub mod surge;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{eta_minutes, haversine_miles};
use crate::models::driver::{GeoPoint, VehicleCategory};
use crate::pricing::surge::{Region, SurgeEstimator};

/// Surge never scales a fare beyond 2x, whatever demand says.
pub const SURGE_CAP: f64 = 2.0;

/// A trip endpoint within this distance of an airport picks up its flat fee.
pub const AIRPORT_RADIUS_MILES: f64 = 2.0;

/// Pinned quotes older than this are not honored at dispatch time.
const QUOTE_TTL_MINS: i64 = 10;

struct RateCard {
    base_cents: i64,
    per_mile_cents: i64,
    per_minute_cents: i64,
}

/// Unknown categories price as economy; candidate matching still compares
/// the literal category name.
fn rates_for(category: &VehicleCategory) -> RateCard {
    match category.as_str() {
        "premium" => RateCard {
            base_cents: 400,
            per_mile_cents: 175,
            per_minute_cents: 35,
        },
        "luxury" => RateCard {
            base_cents: 600,
            per_mile_cents: 250,
            per_minute_cents: 50,
        },
        _ => RateCard {
            base_cents: 250,
            per_mile_cents: 125,
            per_minute_cents: 25,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Airport {
    pub code: &'static str,
    pub location: GeoPoint,
    pub fee_cents: i64,
}

pub fn default_airports() -> Vec<Airport> {
    vec![
        Airport {
            code: "ORD",
            location: GeoPoint {
                lat: 41.9786,
                lng: -87.9048,
            },
            fee_cents: 500,
        },
        Airport {
            code: "MDW",
            location: GeoPoint {
                lat: 41.7868,
                lng: -87.7524,
            },
            fee_cents: 300,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A computed fare, returned synchronously and optionally pinned by id for
/// reuse as the committed fare at dispatch time. Line items always sum to
/// `total_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub category: VehicleCategory,
    pub distance_miles: f64,
    pub eta_minutes: u32,
    pub line_items: Vec<LineItem>,
    pub surge_multiplier: f64,
    pub surge_cap: f64,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// A pinned quote is only good for the exact trip it priced. Committing
    /// it for different endpoints or a different category would carry an
    /// arbitrary fare onto an unrelated trip.
    pub fn covers(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        category: &VehicleCategory,
    ) -> bool {
        self.pickup == *pickup && self.dropoff == *dropoff && self.category == *category
    }
}

pub struct PricingEngine {
    airports: Vec<Airport>,
    surge: SurgeEstimator,
    quotes: DashMap<Uuid, Quote>,
}

impl PricingEngine {
    pub fn new(airports: Vec<Airport>, surge: SurgeEstimator) -> Self {
        Self {
            airports,
            surge,
            quotes: DashMap::new(),
        }
    }

    /// Computes a quote from trip geometry, category, the current surge
    /// reading and the fixed fee table, and pins it for later reuse.
    pub fn quote(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        category: &VehicleCategory,
    ) -> Result<Quote, AppError> {
        let raw_surge = self.surge.current_multiplier(Region::containing(pickup));
        let quote = compute_quote(pickup, dropoff, category, raw_surge, &self.airports)?;
        self.pin(quote.clone());
        Ok(quote)
    }

    /// Looks up a previously pinned quote, honoring the TTL.
    pub fn pinned(&self, id: Uuid) -> Option<Quote> {
        let quote = self.quotes.get(&id)?;
        if Utc::now() - quote.created_at > Duration::minutes(QUOTE_TTL_MINS) {
            return None;
        }
        Some(quote.clone())
    }

    fn pin(&self, quote: Quote) {
        let expired_before = Utc::now() - Duration::minutes(QUOTE_TTL_MINS);
        self.quotes.retain(|_, q| q.created_at >= expired_before);
        self.quotes.insert(quote.id, quote);
    }
}

/// Pure fare assembly: deterministic given geometry, category and surge.
///
/// Each line item is rounded to cents independently; the surge line is
/// computed as `total - pre-surge subtotal` so any rounding error lands in
/// that one line and the items always sum to the total.
pub fn compute_quote(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    category: &VehicleCategory,
    raw_surge: f64,
    airports: &[Airport],
) -> Result<Quote, AppError> {
    if !pickup.is_valid() || !dropoff.is_valid() {
        return Err(AppError::QuoteComputationFailed(
            "pickup/dropoff coordinates out of range".to_string(),
        ));
    }

    let distance_miles = haversine_miles(pickup, dropoff);
    if !distance_miles.is_finite() {
        return Err(AppError::QuoteComputationFailed(
            "distance computation failed".to_string(),
        ));
    }
    let duration_minutes = eta_minutes(distance_miles);

    let rates = rates_for(category);
    let base_cents = rates.base_cents;
    let distance_cents = (distance_miles * rates.per_mile_cents as f64).round() as i64;
    let time_cents = duration_minutes as i64 * rates.per_minute_cents;

    let mut line_items = vec![
        LineItem {
            name: "Base Fare".to_string(),
            amount_cents: base_cents,
            description: None,
        },
        LineItem {
            name: "Distance".to_string(),
            amount_cents: distance_cents,
            description: Some(format!("{distance_miles:.1} miles")),
        },
        LineItem {
            name: "Time".to_string(),
            amount_cents: time_cents,
            description: Some(format!("{duration_minutes} minutes")),
        },
    ];

    // At most one airport fee per trip; first configured match wins.
    let airport_cents = airports
        .iter()
        .find(|airport| {
            haversine_miles(pickup, &airport.location) <= AIRPORT_RADIUS_MILES
                || haversine_miles(dropoff, &airport.location) <= AIRPORT_RADIUS_MILES
        })
        .map(|airport| {
            line_items.push(LineItem {
                name: "Airport Fee".to_string(),
                amount_cents: airport.fee_cents,
                description: Some(airport.code.to_string()),
            });
            airport.fee_cents
        })
        .unwrap_or(0);

    let pre_surge_cents = base_cents + distance_cents + time_cents + airport_cents;
    let effective_surge = effective_surge(raw_surge);

    let total_cents = if effective_surge > 1.0 {
        let total = (pre_surge_cents as f64 * effective_surge).round() as i64;
        line_items.push(LineItem {
            name: "Surge Pricing".to_string(),
            amount_cents: total - pre_surge_cents,
            description: Some(format!("{effective_surge:.1}x demand")),
        });
        total
    } else {
        pre_surge_cents
    };

    Ok(Quote {
        id: Uuid::new_v4(),
        pickup: *pickup,
        dropoff: *dropoff,
        category: category.clone(),
        distance_miles,
        eta_minutes: duration_minutes,
        line_items,
        surge_multiplier: effective_surge,
        surge_cap: SURGE_CAP,
        total_cents,
        created_at: Utc::now(),
    })
}

pub fn effective_surge(raw: f64) -> f64 {
    raw.clamp(1.0, SURGE_CAP)
}
