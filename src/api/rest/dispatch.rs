use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::engine::dispatch::DispatchOutcome;
use crate::error::AppError;
use crate::models::driver::{DriverCandidate, GeoPoint, VehicleCategory};
use crate::models::trip::{RideRequest, Trip, TripStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch/find-drivers", post(find_drivers))
        .route("/dispatch/dispatch-ride", post(dispatch_ride))
        .route("/dispatch/accept-offer/:offer_id", put(accept_offer))
        .route("/dispatch/decline-offer/:offer_id", put(decline_offer))
        .route("/dispatch/cancel-trip/:trip_id", put(cancel_trip))
        .route("/dispatch/trips/:trip_id", get(get_trip))
        .route("/dispatch/trips/:trip_id/status", put(update_trip_status))
}

#[derive(Deserialize)]
pub struct FindDriversRequest {
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub category: String,
    pub max_distance: Option<f64>,
}

#[derive(Serialize)]
pub struct FindDriversResponse {
    pub success: bool,
    pub drivers: Vec<DriverCandidate>,
    pub count: usize,
}

async fn find_drivers(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FindDriversRequest>,
) -> Result<Json<FindDriversResponse>, AppError> {
    let pickup = GeoPoint {
        lat: payload.pickup_lat,
        lng: payload.pickup_lng,
    };
    if !pickup.is_valid() {
        return Err(AppError::BadRequest(
            "pickup coordinates out of range".to_string(),
        ));
    }

    let drivers = dispatch::find_drivers(
        &state,
        &pickup,
        &VehicleCategory::new(payload.category),
        payload.max_distance,
    );
    let count = drivers.len();

    Ok(Json(FindDriversResponse {
        success: true,
        drivers,
        count,
    }))
}

#[derive(Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct DispatchRideRequest {
    pub rider_id: String,
    pub rider_name: String,
    pub rider_phone: String,
    pub pickup: Endpoint,
    pub dropoff: Endpoint,
    pub category: String,
    // Client-side estimate, accepted for compatibility; the committed fare
    // is always computed server-side.
    #[allow(dead_code)]
    pub estimated_fare: Option<i64>,
    pub quote_id: Option<Uuid>,
    pub special_instructions: Option<String>,
}

#[derive(Serialize)]
pub struct DispatchRideResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<Uuid>,
    pub message: String,
}

async fn dispatch_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DispatchRideRequest>,
) -> Result<Json<DispatchRideResponse>, AppError> {
    let request = RideRequest {
        rider_id: payload.rider_id,
        rider_name: payload.rider_name,
        rider_phone: payload.rider_phone,
        pickup_address: payload.pickup.address,
        dropoff_address: payload.dropoff.address,
        pickup: GeoPoint {
            lat: payload.pickup.lat,
            lng: payload.pickup.lng,
        },
        dropoff: GeoPoint {
            lat: payload.dropoff.lat,
            lng: payload.dropoff.lng,
        },
        category: VehicleCategory::new(payload.category),
        quote_id: payload.quote_id,
        special_instructions: payload.special_instructions,
    };

    match dispatch::dispatch(&state, request).await? {
        DispatchOutcome::Dispatched { trip_id } => Ok(Json(DispatchRideResponse {
            success: true,
            trip_id: Some(trip_id),
            message: "Ride dispatched to available drivers".to_string(),
        })),
        DispatchOutcome::NoDriversAvailable => Ok(Json(DispatchRideResponse {
            success: false,
            trip_id: None,
            message: "No available drivers found".to_string(),
        })),
    }
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    pub driver_id: Uuid,
}

#[derive(Serialize)]
pub struct OfferResponseResponse {
    pub success: bool,
    pub message: String,
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<OfferResponseResponse>, AppError> {
    let success = dispatch::accept_offer(&state, payload.driver_id, offer_id).await?;
    Ok(Json(OfferResponseResponse {
        success,
        message: if success {
            "Offer accepted successfully".to_string()
        } else {
            "Offer no longer available".to_string()
        },
    }))
}

async fn decline_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<OfferResponseResponse>, AppError> {
    let success = dispatch::decline_offer(&state, payload.driver_id, offer_id).await?;
    Ok(Json(OfferResponseResponse {
        success,
        message: if success {
            "Offer declined".to_string()
        } else {
            "Offer no longer available".to_string()
        },
    }))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<OfferResponseResponse>, AppError> {
    dispatch::cancel_trip(&state, trip_id).await?;
    Ok(Json(OfferResponseResponse {
        success: true,
        message: "Trip cancelled".to_string(),
    }))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let trip = state
        .trips
        .get(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
    Ok(Json(trip.clone()))
}

#[derive(Deserialize)]
pub struct UpdateTripStatusRequest {
    pub status: TripStatus,
}

async fn update_trip_status(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<UpdateTripStatusRequest>,
) -> Result<Json<Trip>, AppError> {
    let trip = dispatch::update_trip_status(&state, trip_id, payload.status)?;
    Ok(Json(trip))
}
