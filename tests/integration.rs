use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_dispatch::api::rest::router;
use ride_dispatch::config::Config;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> axum::Router {
    router(Arc::new(AppState::new(Config::default())))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register_driver(app: &axum::Router, name: &str, lat: f64, lng: f64, rating: f64) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "name": name,
                "category": "economy",
                "location": { "lat": lat, "lng": lng },
                "rating": rating
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

fn loop_to_river_north_ride() -> Value {
    json!({
        "rider_id": "rider-1",
        "rider_name": "Grace",
        "rider_phone": "+1-555-0101",
        "pickup": { "address": "233 S Wacker Dr", "lat": 41.8789, "lng": -87.6359 },
        "dropoff": { "address": "600 E Grand Ave", "lat": 41.8916, "lng": -87.6079 },
        "category": "economy"
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["trips"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_offers"));
}

#[tokio::test]
async fn register_driver_returns_driver() {
    let app = setup();
    let driver = register_driver(&app, "Alice", 41.88, -87.63, 4.5).await;

    assert_eq!(driver["name"], "Alice");
    assert_eq!(driver["status"], "online");
    assert_eq!(driver["category"], "economy");
    assert_eq!(driver["rating"], 4.5);
    assert!(!driver["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn register_driver_empty_name_returns_400() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "name": "  ",
                "category": "economy",
                "location": { "lat": 41.88, "lng": -87.63 },
                "rating": 4.5
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_driver_rating_clamped_to_5() {
    let app = setup();
    let driver = register_driver(&app, "Max", 41.88, -87.63, 9.9).await;
    assert_eq!(driver["rating"], 5.0);
}

#[tokio::test]
async fn update_driver_location_refreshes_snapshot() {
    let app = setup();
    let driver = register_driver(&app, "Frank", 41.88, -87.63, 4.0).await;
    let id = driver["id"].as_str().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/drivers/{id}/location"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "location": { "lat": 41.90, "lng": -87.65 } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["location"]["lat"], 41.90);
    assert_eq!(body["location"]["lng"], -87.65);
}

#[tokio::test]
async fn find_drivers_returns_ranked_candidates() {
    let app = setup();
    let near = register_driver(&app, "Near", 41.879, -87.636, 4.0).await;
    let far = register_driver(&app, "Far", 41.93, -87.70, 5.0).await;
    // Offline driver never matches.
    let offline = register_driver(&app, "Offline", 41.879, -87.636, 5.0).await;
    let offline_id = offline["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/drivers/{offline_id}/status"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "status": "offline" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            "POST",
            "/dispatch/find-drivers",
            json!({
                "pickup_lat": 41.8789,
                "pickup_lng": -87.6359,
                "category": "economy"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);

    let drivers = body["drivers"].as_array().unwrap();
    assert_eq!(drivers[0]["driver_id"], near["id"]);
    assert_eq!(drivers[1]["driver_id"], far["id"]);
    assert!(
        drivers[0]["distance_miles"].as_f64().unwrap()
            <= drivers[1]["distance_miles"].as_f64().unwrap()
    );
}

#[tokio::test]
async fn find_drivers_with_nobody_nearby_is_empty_success() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/dispatch/find-drivers",
            json!({
                "pickup_lat": 41.8789,
                "pickup_lng": -87.6359,
                "category": "economy"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn quote_line_items_sum_to_total() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/pricing/quote",
            json!({
                "category": "premium",
                "service": "ride",
                "pickup": { "lat": 41.8789, "lng": -87.6359, "address": "233 S Wacker Dr" },
                "dropoff": { "lat": 41.9088, "lng": -87.6796, "address": "1425 N Damen Ave" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let total = body["total_cents"].as_i64().unwrap();
    let sum: i64 = body["line_items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|li| li["amount_cents"].as_i64().unwrap())
        .sum();
    assert_eq!(sum, total);
    assert!(total > 0);
    assert_eq!(body["surge_cap"], 2.0);
    assert!(body["eta_minutes"].as_u64().unwrap() > 0);
    assert!(!body["quote_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn quote_near_ord_includes_airport_fee() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/pricing/quote",
            json!({
                "category": "black_sedan",
                "pickup": { "lat": 41.8781, "lng": -87.6298, "address": "Chicago Loop" },
                "dropoff": { "lat": 41.9786, "lng": -87.9048, "address": "O'Hare" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let airport_fees: Vec<&Value> = body["line_items"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|li| li["name"] == "Airport Fee")
        .collect();
    assert_eq!(airport_fees.len(), 1);
    assert!(airport_fees[0]["amount_cents"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn dispatch_with_no_drivers_reports_no_drivers_and_creates_no_trip() {
    let app = setup();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/dispatch/dispatch-ride",
            loop_to_river_north_ride(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["trip_id"].is_null());
    assert_eq!(body["message"], "No available drivers found");

    let health = body_json(app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health["trips"], 0);
}

#[tokio::test]
async fn full_dispatch_and_accept_flow() {
    let app = setup();

    let winner = register_driver(&app, "Winner", 41.879, -87.636, 4.9).await;
    let runner_up = register_driver(&app, "RunnerUp", 41.885, -87.64, 4.2).await;
    let winner_id = winner["id"].as_str().unwrap().to_string();
    let runner_up_id = runner_up["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/dispatch/dispatch-ride",
            loop_to_river_north_ride(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let trip_id = body["trip_id"].as_str().unwrap().to_string();

    // Both drivers hold a pending offer for the trip.
    let offers = body_json(
        app.clone()
            .oneshot(get_request(&format!("/drivers/{winner_id}/offers")))
            .await
            .unwrap(),
    )
    .await;
    let winner_offer = &offers.as_array().unwrap()[0];
    assert_eq!(winner_offer["trip_id"], trip_id.as_str());
    assert_eq!(winner_offer["status"], "pending");
    assert!(winner_offer["estimated_fare_cents"].as_i64().unwrap() > 0);
    let winner_offer_id = winner_offer["id"].as_str().unwrap().to_string();

    let offers = body_json(
        app.clone()
            .oneshot(get_request(&format!("/drivers/{runner_up_id}/offers")))
            .await
            .unwrap(),
    )
    .await;
    let loser_offer_id = offers.as_array().unwrap()[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // First acceptance wins.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/dispatch/accept-offer/{winner_offer_id}"),
            json!({ "driver_id": winner_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    // The sibling offer lost the race.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/dispatch/accept-offer/{loser_offer_id}"),
            json!({ "driver_id": runner_up_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Offer no longer available");

    let trip = body_json(
        app.clone()
            .oneshot(get_request(&format!("/dispatch/trips/{trip_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(trip["status"], "accepted");
    assert_eq!(trip["driver_id"], winner_id.as_str());
    assert_eq!(
        trip["fare"]["net_payout_cents"].as_i64().unwrap()
            + trip["fare"]["commission_cents"].as_i64().unwrap(),
        trip["fare"]["fare_cents"].as_i64().unwrap()
    );

    let drivers = body_json(app.clone().oneshot(get_request("/drivers")).await.unwrap()).await;
    let winner_now = drivers
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["id"] == winner_id.as_str())
        .unwrap();
    assert_eq!(winner_now["status"], "en_route_pickup");

    // Trip progresses monotonically to completion.
    for status in ["en_route_pickup", "arrived_pickup", "in_progress", "completed"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/dispatch/trips/{trip_id}/status"),
                json!({ "status": status }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], status);
    }

    // Completed trips are immutable.
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/dispatch/trips/{trip_id}/status"),
            json!({ "status": "in_progress" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn declined_offer_leaves_trip_offered() {
    let app = setup();
    let driver = register_driver(&app, "Decliner", 41.879, -87.636, 4.5).await;
    // A second driver keeps a sibling offer live after the decline.
    register_driver(&app, "Other", 41.885, -87.64, 4.5).await;
    let driver_id = driver["id"].as_str().unwrap().to_string();

    let body = body_json(
        app.clone()
            .oneshot(json_request(
                "POST",
                "/dispatch/dispatch-ride",
                loop_to_river_north_ride(),
            ))
            .await
            .unwrap(),
    )
    .await;
    let trip_id = body["trip_id"].as_str().unwrap().to_string();

    let offers = body_json(
        app.clone()
            .oneshot(get_request(&format!("/drivers/{driver_id}/offers")))
            .await
            .unwrap(),
    )
    .await;
    let offer_id = offers.as_array().unwrap()[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = body_json(
        app.clone()
            .oneshot(json_request(
                "PUT",
                &format!("/dispatch/decline-offer/{offer_id}"),
                json!({ "driver_id": driver_id }),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["success"], true);

    let trip = body_json(
        app.oneshot(get_request(&format!("/dispatch/trips/{trip_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(trip["status"], "offered");
}

#[tokio::test]
async fn cancel_trip_supersedes_offers() {
    let app = setup();
    let driver = register_driver(&app, "Standby", 41.879, -87.636, 4.5).await;
    let driver_id = driver["id"].as_str().unwrap().to_string();

    let body = body_json(
        app.clone()
            .oneshot(json_request(
                "POST",
                "/dispatch/dispatch-ride",
                loop_to_river_north_ride(),
            ))
            .await
            .unwrap(),
    )
    .await;
    let trip_id = body["trip_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/dispatch/cancel-trip/{trip_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let trip = body_json(
        app.clone()
            .oneshot(get_request(&format!("/dispatch/trips/{trip_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(trip["status"], "cancelled");

    let offers = body_json(
        app.oneshot(get_request(&format!("/drivers/{driver_id}/offers")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(offers.as_array().unwrap()[0]["status"], "superseded");
}

#[tokio::test]
async fn get_nonexistent_trip_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/dispatch/trips/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accept_unknown_offer_reports_failure_not_error() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/dispatch/accept-offer/{fake_id}"),
            json!({ "driver_id": "11111111-1111-1111-1111-111111111111" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}
