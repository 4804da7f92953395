use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::offer::{OfferStatus, RideOffer};
use crate::models::trip::TripStatus;

/// State transitions published for delivery to connected clients. The core
/// only emits; delivery and retry belong to the transport side (here the
/// websocket handler, in production a pub/sub client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    OfferCreated {
        offer: Box<RideOffer>,
    },
    OfferResolved {
        offer_id: Uuid,
        trip_id: Uuid,
        driver_id: Uuid,
        status: OfferStatus,
    },
    TripUpdated {
        trip_id: Uuid,
        status: TripStatus,
        driver_id: Option<Uuid>,
    },
}

impl DispatchEvent {
    pub fn trip_id(&self) -> Uuid {
        match self {
            DispatchEvent::OfferCreated { offer } => offer.trip_id,
            DispatchEvent::OfferResolved { trip_id, .. } => *trip_id,
            DispatchEvent::TripUpdated { trip_id, .. } => *trip_id,
        }
    }

    /// The driver an event concerns. Trip transitions before assignment
    /// concern no driver.
    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            DispatchEvent::OfferCreated { offer } => Some(offer.driver_id),
            DispatchEvent::OfferResolved { driver_id, .. } => Some(*driver_id),
            DispatchEvent::TripUpdated { driver_id, .. } => *driver_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }

    /// Fire-and-forget. No subscribers is not an error.
    pub fn publish(&self, event: DispatchEvent) {
        tracing::debug!(?event, "publishing dispatch event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }
}
