use std::time::Instant;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::engine::offers::OfferResolution;
use crate::error::AppError;
use crate::events::DispatchEvent;
use crate::geo::GeoIndex;
use crate::models::driver::{DriverCandidate, DriverStatus, GeoPoint, VehicleCategory};
use crate::models::trip::{FareBreakdown, RideRequest, Trip, TripStatus};
use crate::pricing::surge::Region;
use crate::state::AppState;

/// `NoDriversAvailable` is a first-class outcome of dispatch, not an error:
/// the caller decides whether to relax the radius, retry, or notify the
/// rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { trip_id: Uuid },
    NoDriversAvailable,
}

pub fn find_drivers(
    state: &AppState,
    pickup: &GeoPoint,
    category: &VehicleCategory,
    max_distance_miles: Option<f64>,
) -> Vec<DriverCandidate> {
    let radius = max_distance_miles.unwrap_or(state.config.max_search_radius_miles);
    GeoIndex::new(&state.drivers, state.config.location_freshness_secs)
        .find_candidates(pickup, category, radius)
}

/// Request → candidates → committed fare → trip record → offer fan-out.
/// Returns as soon as offers are out; acceptance arrives asynchronously
/// through the offer broker.
pub async fn dispatch(
    state: &AppState,
    request: RideRequest,
) -> Result<DispatchOutcome, AppError> {
    let start = Instant::now();
    let outcome = run_dispatch(state, request).await;

    let label = match &outcome {
        Ok(DispatchOutcome::Dispatched { .. }) => "dispatched",
        Ok(DispatchOutcome::NoDriversAvailable) => "no_drivers",
        Err(_) => "error",
    };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .dispatches_total
        .with_label_values(&[label])
        .inc();

    outcome
}

async fn run_dispatch(
    state: &AppState,
    request: RideRequest,
) -> Result<DispatchOutcome, AppError> {
    if !request.pickup.is_valid() || !request.dropoff.is_valid() {
        return Err(AppError::BadRequest(
            "pickup/dropoff coordinates out of range".to_string(),
        ));
    }

    let candidates = find_drivers(state, &request.pickup, &request.category, None);
    if candidates.is_empty() {
        info!(rider_id = %request.rider_id, "no qualifying drivers; nothing dispatched");
        return Ok(DispatchOutcome::NoDriversAvailable);
    }

    // Committed fare: reuse the pinned quote when the rider carried one
    // through from quoting, otherwise price fresh. A pinned quote counts
    // only if it priced this exact trip; a stale or mismatched id falls
    // back to fresh pricing rather than committing someone else's fare.
    let pinned = request
        .quote_id
        .and_then(|id| state.pricing.pinned(id))
        .filter(|q| q.covers(&request.pickup, &request.dropoff, &request.category));
    let quote = match pinned {
        Some(pinned) => pinned,
        None => state
            .pricing
            .quote(&request.pickup, &request.dropoff, &request.category)?,
    };

    let trip = Trip {
        id: Uuid::new_v4(),
        rider_id: request.rider_id,
        rider_name: request.rider_name,
        rider_phone: request.rider_phone,
        pickup_address: request.pickup_address,
        dropoff_address: request.dropoff_address,
        pickup: request.pickup,
        dropoff: request.dropoff,
        category: request.category,
        distance_miles: quote.distance_miles,
        fare: FareBreakdown::from_total(quote.total_cents, quote.surge_multiplier),
        driver_id: None,
        status: TripStatus::Requested,
        special_instructions: request.special_instructions,
        created_at: Utc::now(),
    };
    let trip_id = trip.id;

    state.trips.insert(trip_id, trip.clone());
    state
        .demand
        .record(Region::containing(&trip.pickup), trip.created_at);
    state.events.publish(DispatchEvent::TripUpdated {
        trip_id,
        status: TripStatus::Requested,
        driver_id: None,
    });

    state
        .offers
        .create_offers(&trip, &candidates, state.config.offer_fanout)
        .await;

    let mut advanced = false;
    if let Some(mut stored) = state.trips.get_mut(&trip_id) {
        // A very fast acceptance (or every offer dying first) may already
        // have moved the trip on.
        if stored.status == TripStatus::Requested {
            stored.status = TripStatus::Offered;
            advanced = true;
        }
    }
    if advanced {
        state.events.publish(DispatchEvent::TripUpdated {
            trip_id,
            status: TripStatus::Offered,
            driver_id: None,
        });
    }

    info!(%trip_id, candidates = candidates.len(), "ride dispatched");
    Ok(DispatchOutcome::Dispatched { trip_id })
}

/// Thin pass-through to the offer broker. Lost races and unknown offers
/// come back as `false`, which the driver app renders as "offer no longer
/// available".
pub async fn accept_offer(
    state: &AppState,
    driver_id: Uuid,
    offer_id: Uuid,
) -> Result<bool, AppError> {
    respond_as_bool(state, driver_id, offer_id, true).await
}

pub async fn decline_offer(
    state: &AppState,
    driver_id: Uuid,
    offer_id: Uuid,
) -> Result<bool, AppError> {
    respond_as_bool(state, driver_id, offer_id, false).await
}

async fn respond_as_bool(
    state: &AppState,
    driver_id: Uuid,
    offer_id: Uuid,
    accepted: bool,
) -> Result<bool, AppError> {
    match state.offers.respond(driver_id, offer_id, accepted).await {
        Ok(OfferResolution::Accepted | OfferResolution::Declined) => Ok(true),
        Err(AppError::AlreadyResolved | AppError::NotFound(_)) => Ok(false),
        Err(other) => Err(other),
    }
}

/// Rider cancellation. Allowed while the trip is still `requested` or
/// `offered`; pending offers are superseded immediately instead of being
/// left to expire on driver screens.
pub async fn cancel_trip(state: &AppState, trip_id: Uuid) -> Result<(), AppError> {
    {
        let trip = state
            .trips
            .get(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
        if !trip.status.can_transition_to(TripStatus::Cancelled) {
            return Err(AppError::Conflict(format!(
                "trip cannot be cancelled from status {:?}",
                trip.status
            )));
        }
    }

    state.offers.cancel_for_trip(trip_id).await;

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
    // A driver may have accepted between the check and the supersede; the
    // transition check settles who won.
    if !trip.status.can_transition_to(TripStatus::Cancelled) {
        return Err(AppError::Conflict(format!(
            "trip cannot be cancelled from status {:?}",
            trip.status
        )));
    }
    trip.status = TripStatus::Cancelled;
    let status = trip.status;
    drop(trip);

    state.events.publish(DispatchEvent::TripUpdated {
        trip_id,
        status,
        driver_id: None,
    });
    info!(%trip_id, "trip cancelled by rider");
    Ok(())
}

/// Forward trip progression (accepted → en_route_pickup → arrived_pickup →
/// in_progress → completed), keeping the assigned driver's status in step.
pub fn update_trip_status(
    state: &AppState,
    trip_id: Uuid,
    next: TripStatus,
) -> Result<Trip, AppError> {
    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

    if !trip.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "invalid trip transition {:?} -> {:?}",
            trip.status, next
        )));
    }
    trip.status = next;
    let snapshot = trip.clone();
    drop(trip);

    if let Some(driver_id) = snapshot.driver_id {
        let driver_status = match next {
            TripStatus::EnRoutePickup => Some(DriverStatus::EnRoutePickup),
            TripStatus::ArrivedPickup => Some(DriverStatus::ArrivedPickup),
            TripStatus::InProgress => Some(DriverStatus::OnTrip),
            TripStatus::Completed => Some(DriverStatus::Online),
            _ => None,
        };
        if let Some(status) = driver_status {
            if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
                driver.status = status;
            }
        }
    }

    state.events.publish(DispatchEvent::TripUpdated {
        trip_id,
        status: next,
        driver_id: snapshot.driver_id,
    });
    Ok(snapshot)
}
