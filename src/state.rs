use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::offers::OfferBroker;
use crate::events::EventBus;
use crate::models::driver::Driver;
use crate::models::trip::Trip;
use crate::observability::metrics::Metrics;
use crate::pricing::surge::{RequestLog, SurgeEstimator};
use crate::pricing::{default_airports, PricingEngine};

/// Shared application state. The driver and trip maps stand in for the
/// registry and persistence collaborators; the event bus stands in for the
/// outbound change-notification transport.
pub struct AppState {
    pub config: Config,
    pub drivers: Arc<DashMap<Uuid, Driver>>,
    pub trips: Arc<DashMap<Uuid, Trip>>,
    pub demand: Arc<RequestLog>,
    pub pricing: PricingEngine,
    pub offers: OfferBroker,
    pub events: EventBus,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let drivers: Arc<DashMap<Uuid, Driver>> = Arc::new(DashMap::new());
        let trips: Arc<DashMap<Uuid, Trip>> = Arc::new(DashMap::new());
        let events = EventBus::new(config.event_buffer_size);
        let metrics = Metrics::new();

        let demand = Arc::new(RequestLog::new(chrono::Duration::minutes(
            config.surge_window_mins,
        )));
        let surge = SurgeEstimator::new(demand.clone(), config.surge_window_mins);
        let pricing = PricingEngine::new(default_airports(), surge);

        let offers = OfferBroker::new(
            trips.clone(),
            drivers.clone(),
            events.clone(),
            metrics.clone(),
            Duration::from_secs(config.offer_window_secs),
        );

        Self {
            config,
            drivers,
            trips,
            demand,
            pricing,
            offers,
            events,
            metrics,
        }
    }
}
