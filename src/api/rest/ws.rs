use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::DispatchEvent;
use crate::state::AppState;

/// Subscription scope, taken from query parameters. A driver app connects
/// with `?driver_id=...` to see only its own offers and assignments; a rider
/// app follows one trip with `?trip_id=...`. No parameters means the full
/// firehose.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StreamFilter {
    pub driver_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,
}

impl StreamFilter {
    fn admits(&self, event: &DispatchEvent) -> bool {
        if let Some(driver_id) = self.driver_id {
            if event.driver_id() != Some(driver_id) {
                return false;
            }
        }
        if let Some(trip_id) = self.trip_id {
            if event.trip_id() != trip_id {
                return false;
            }
        }
        true
    }
}

/// Streams offer and trip transitions to connected clients, scoped by the
/// connection's filter. Delivery and retry belong to the client side; the
/// core just emits.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<StreamFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: StreamFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events.subscribe();

    info!(?filter, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if !filter.admits(&event) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize dispatch event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
