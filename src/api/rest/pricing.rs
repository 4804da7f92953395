use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{GeoPoint, VehicleCategory};
use crate::pricing::LineItem;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/pricing/quote", post(quote))
}

#[derive(Deserialize)]
pub struct QuoteEndpoint {
    pub lat: f64,
    pub lng: f64,
    #[allow(dead_code)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub category: String,
    // Accepted for client compatibility; all quotes price the ride service.
    #[allow(dead_code)]
    pub service: Option<String>,
    pub pickup: QuoteEndpoint,
    pub dropoff: QuoteEndpoint,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub total_cents: i64,
    pub line_items: Vec<LineItem>,
    pub surge_multiplier: f64,
    pub surge_cap: f64,
    pub eta_minutes: u32,
    pub quote_id: Uuid,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let pickup = GeoPoint {
        lat: payload.pickup.lat,
        lng: payload.pickup.lng,
    };
    let dropoff = GeoPoint {
        lat: payload.dropoff.lat,
        lng: payload.dropoff.lng,
    };

    let quote = state
        .pricing
        .quote(&pickup, &dropoff, &VehicleCategory::new(payload.category))?;

    Ok(Json(QuoteResponse {
        total_cents: quote.total_cents,
        line_items: quote.line_items,
        surge_multiplier: quote.surge_multiplier,
        surge_cap: quote.surge_cap,
        eta_minutes: quote.eta_minutes,
        quote_id: quote.id,
    }))
}
