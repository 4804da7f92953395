use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{DispatchEvent, EventBus};
use crate::models::driver::{Driver, DriverCandidate, DriverStatus};
use crate::models::offer::{OfferStatus, RideOffer};
use crate::models::trip::{Trip, TripStatus};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResolution {
    Accepted,
    Declined,
}

/// Manages offer fan-out and resolution.
///
/// The offer set of a trip is the unit of mutual exclusion: every transition
/// touching a trip's offers (fan-out, response, expiry, cancellation) runs
/// under that trip's mutex, so the read-check-transition on an offer status
/// is indivisible and at most one offer per trip can ever reach `accepted`.
/// Unrelated trips share nothing and proceed independently.
#[derive(Clone)]
pub struct OfferBroker {
    inner: Arc<Inner>,
}

struct Inner {
    trips: Arc<DashMap<Uuid, Trip>>,
    drivers: Arc<DashMap<Uuid, Driver>>,
    offer_sets: DashMap<Uuid, Arc<Mutex<Vec<RideOffer>>>>,
    offer_index: DashMap<Uuid, Uuid>,
    timers: DashMap<Uuid, AbortHandle>,
    events: EventBus,
    metrics: Metrics,
    offer_window: Duration,
}

impl OfferBroker {
    pub fn new(
        trips: Arc<DashMap<Uuid, Trip>>,
        drivers: Arc<DashMap<Uuid, Driver>>,
        events: EventBus,
        metrics: Metrics,
        offer_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                trips,
                drivers,
                offer_sets: DashMap::new(),
                offer_index: DashMap::new(),
                timers: DashMap::new(),
                events,
                metrics,
                offer_window,
            }),
        }
    }

    /// Creates one pending offer per ranked candidate (truncated to `top_n`)
    /// and schedules a cancellable expiry per offer at the window boundary.
    pub async fn create_offers(
        &self,
        trip: &Trip,
        candidates: &[DriverCandidate],
        top_n: usize,
    ) -> Vec<Uuid> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.inner.offer_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(15));

        let offers: Vec<RideOffer> = candidates
            .iter()
            .take(top_n)
            .map(|candidate| RideOffer {
                id: Uuid::new_v4(),
                trip_id: trip.id,
                driver_id: candidate.driver_id,
                rider_name: trip.rider_name.clone(),
                rider_phone: trip.rider_phone.clone(),
                pickup_address: trip.pickup_address.clone(),
                dropoff_address: trip.dropoff_address.clone(),
                pickup: trip.pickup,
                dropoff: trip.dropoff,
                category: trip.category.clone(),
                estimated_fare_cents: trip.fare.fare_cents,
                net_payout_cents: trip.fare.net_payout_cents,
                estimated_distance_miles: trip.distance_miles,
                estimated_duration_minutes: crate::geo::eta_minutes(trip.distance_miles),
                pickup_eta_minutes: candidate.pickup_eta_minutes,
                special_instructions: trip.special_instructions.clone(),
                status: OfferStatus::Pending,
                created_at: now,
                expires_at,
            })
            .collect();

        let offer_ids: Vec<Uuid> = offers.iter().map(|o| o.id).collect();

        for offer in &offers {
            self.inner.offer_index.insert(offer.id, trip.id);
            self.inner
                .events
                .publish(DispatchEvent::OfferCreated {
                    offer: Box::new(offer.clone()),
                });
        }
        self.inner.metrics.active_offers.add(offers.len() as i64);

        self.inner
            .offer_sets
            .insert(trip.id, Arc::new(Mutex::new(offers)));

        for offer_id in &offer_ids {
            self.schedule_expiry(trip.id, *offer_id);
        }

        info!(trip_id = %trip.id, offers = offer_ids.len(), "offers fanned out");
        offer_ids
    }

    /// Resolves one driver's response. The status check and transition, the
    /// sibling supersede, and the trip/driver updates happen as one unit
    /// under the trip's offer lock.
    pub async fn respond(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        accepted: bool,
    ) -> Result<OfferResolution, AppError> {
        let trip_id = *self
            .inner
            .offer_index
            .get(&offer_id)
            .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;
        let offer_set = self.offer_set(trip_id)?;
        let mut offers = offer_set.lock().await;

        let pos = offers
            .iter()
            .position(|o| o.id == offer_id && o.driver_id == driver_id)
            .ok_or_else(|| AppError::NotFound(format!("offer {offer_id} not found")))?;

        if offers[pos].status != OfferStatus::Pending {
            return Err(AppError::AlreadyResolved);
        }

        if accepted {
            self.resolve(&mut offers[pos], OfferStatus::Accepted);
            for offer in offers.iter_mut() {
                if offer.is_pending() {
                    self.resolve(offer, OfferStatus::Superseded);
                }
            }

            if let Some(mut trip) = self.inner.trips.get_mut(&trip_id) {
                trip.status = TripStatus::Accepted;
                trip.driver_id = Some(driver_id);
                self.inner.events.publish(DispatchEvent::TripUpdated {
                    trip_id,
                    status: trip.status,
                    driver_id: trip.driver_id,
                });
            }
            if let Some(mut driver) = self.inner.drivers.get_mut(&driver_id) {
                driver.status = DriverStatus::EnRoutePickup;
            }

            info!(%trip_id, %offer_id, %driver_id, "offer accepted");
            Ok(OfferResolution::Accepted)
        } else {
            self.resolve(&mut offers[pos], OfferStatus::Declined);
            self.finish_if_exhausted(trip_id, &offers);
            debug!(%trip_id, %offer_id, %driver_id, "offer declined");
            Ok(OfferResolution::Declined)
        }
    }

    /// Proactively supersedes any pending offers, e.g. on rider cancellation.
    /// Their expiry timers are cancelled so nothing stale fires later.
    pub async fn cancel_for_trip(&self, trip_id: Uuid) {
        let Ok(offer_set) = self.offer_set(trip_id) else {
            return;
        };
        let mut offers = offer_set.lock().await;
        for offer in offers.iter_mut() {
            if offer.is_pending() {
                self.resolve(offer, OfferStatus::Superseded);
            }
        }
    }

    pub async fn offers_for_trip(&self, trip_id: Uuid) -> Vec<RideOffer> {
        match self.offer_set(trip_id) {
            Ok(offer_set) => offer_set.lock().await.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub async fn offers_for_driver(&self, driver_id: Uuid) -> Vec<RideOffer> {
        let mut found = Vec::new();
        let offer_sets: Vec<Arc<Mutex<Vec<RideOffer>>>> = self
            .inner
            .offer_sets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for offer_set in offer_sets {
            let offers = offer_set.lock().await;
            found.extend(offers.iter().filter(|o| o.driver_id == driver_id).cloned());
        }
        found
    }

    fn offer_set(&self, trip_id: Uuid) -> Result<Arc<Mutex<Vec<RideOffer>>>, AppError> {
        self.inner
            .offer_sets
            .get(&trip_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("no offers for trip {trip_id}")))
    }

    /// Terminal transition out of `pending`. Caller holds the trip's offer
    /// lock and has already verified the offer is pending.
    fn resolve(&self, offer: &mut RideOffer, status: OfferStatus) {
        offer.status = status;
        if let Some((_, timer)) = self.inner.timers.remove(&offer.id) {
            timer.abort();
        }

        self.inner.metrics.active_offers.dec();
        let label = match status {
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Expired => "expired",
            OfferStatus::Superseded => "superseded",
            OfferStatus::Pending => unreachable!("resolve is only called with terminal statuses"),
        };
        self.inner
            .metrics
            .offers_resolved_total
            .with_label_values(&[label])
            .inc();

        self.inner.events.publish(DispatchEvent::OfferResolved {
            offer_id: offer.id,
            trip_id: offer.trip_id,
            driver_id: offer.driver_id,
            status,
        });
    }

    /// When the last live offer dies unaccepted, the trip has run out of
    /// drivers. Offers are live before the coordinator advances the trip to
    /// `offered`, so a decline can land while it still reads `requested`;
    /// both pre-acceptance statuses count as exhaustible.
    fn finish_if_exhausted(&self, trip_id: Uuid, offers: &[RideOffer]) {
        let any_pending = offers.iter().any(|o| o.is_pending());
        let any_accepted = offers.iter().any(|o| o.status == OfferStatus::Accepted);
        if any_pending || any_accepted {
            return;
        }

        if let Some(mut trip) = self.inner.trips.get_mut(&trip_id) {
            if matches!(trip.status, TripStatus::Requested | TripStatus::Offered) {
                trip.status = TripStatus::NoDriversAvailable;
                self.inner.events.publish(DispatchEvent::TripUpdated {
                    trip_id,
                    status: trip.status,
                    driver_id: None,
                });
                info!(%trip_id, "all offers exhausted; no drivers available");
            }
        }
    }

    fn schedule_expiry(&self, trip_id: Uuid, offer_id: Uuid) {
        let broker = self.clone();
        let window = self.inner.offer_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            broker.expire(trip_id, offer_id).await;
        });
        self.inner.timers.insert(offer_id, handle.abort_handle());
    }

    /// Expiry races driver responses for the same offer; whoever takes the
    /// trip lock first wins and the loser sees a resolved offer.
    async fn expire(&self, trip_id: Uuid, offer_id: Uuid) {
        let Ok(offer_set) = self.offer_set(trip_id) else {
            return;
        };
        let mut offers = offer_set.lock().await;

        if let Some(offer) = offers.iter_mut().find(|o| o.id == offer_id) {
            if offer.is_pending() {
                self.resolve(offer, OfferStatus::Expired);
                debug!(%trip_id, %offer_id, "offer expired unanswered");
            }
        }
        self.finish_if_exhausted(trip_id, &offers);
    }
}
