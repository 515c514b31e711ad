use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gig_dispatch::api::rest::router;
use gig_dispatch::engine::queue::DispatchRequest;
use gig_dispatch::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, mpsc::Receiver<DispatchRequest>) {
    let (state, rx) = AppState::new(1024, 1024);
    (router(Arc::new(state)), rx)
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

fn patch_request(uri: &str, body: Value) -> Request<Body> {
    json_request("PATCH", uri, body)
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

fn worker_body(tenant_id: Uuid, name: &str) -> Value {
    json!({
        "tenant_id": tenant_id,
        "name": name,
        "phone": "+2348012345678",
        "worker_type": "delivery",
        "location": { "lat": 6.5244, "lng": 3.3792 },
        "status": "available",
        "is_verified": true
    })
}

fn task_body(tenant_id: Uuid) -> Value {
    json!({
        "tenant_id": tenant_id,
        "task_type": "delivery",
        "pickup": { "lat": 6.5244, "lng": 3.3792 },
        "dropoff": { "lat": 6.4654, "lng": 3.4064 },
        "base_payout": "500",
        "bonus_payout": "100",
        "surge_multiplier": "1.5",
        "description": "parcel to Victoria Island"
    })
}

async fn create_worker(app: &axum::Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/workers", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["workers"], 0);
    assert_eq!(body["tasks"], 0);
    assert_eq!(body["allocations"], 0);
    assert_eq!(body["waiting_offers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
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
    assert!(body.contains("dispatch_queue_depth"));
    assert!(body.contains("workers_busy"));
}

#[tokio::test]
async fn register_worker_applies_defaults() {
    let (app, _rx) = setup();
    let tenant = Uuid::new_v4();
    let body = create_worker(
        &app,
        json!({
            "tenant_id": tenant,
            "name": "Ada",
            "phone": "+2348012345678",
            "worker_type": "sales",
            "location": { "lat": 6.5244, "lng": 3.3792 }
        }),
    )
    .await;

    assert_eq!(body["name"], "Ada");
    assert_eq!(body["status"], "offline");
    assert_eq!(body["rating"], "5");
    assert_eq!(body["total_tasks"], 0);
    assert_eq!(body["is_verified"], false);
    assert_eq!(body["is_active"], true);
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn register_worker_blank_name_returns_400() {
    let (app, _rx) = setup();
    let mut body = worker_body(Uuid::new_v4(), "  ");
    body["name"] = json!("  ");

    let response = app
        .oneshot(json_request("POST", "/workers", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_worker_out_of_range_location_returns_400() {
    let (app, _rx) = setup();
    let mut body = worker_body(Uuid::new_v4(), "Bola");
    body["location"] = json!({ "lat": 95.0, "lng": 3.3792 });

    let response = app
        .oneshot(json_request("POST", "/workers", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_worker_as_busy_returns_400() {
    let (app, _rx) = setup();
    let mut body = worker_body(Uuid::new_v4(), "Chidi");
    body["status"] = json!("busy");

    let response = app
        .oneshot(json_request("POST", "/workers", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_workers_initially_empty() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/workers")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_worker_returns_404() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(get_request(&format!("/workers/{}", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn worker_status_follows_legal_edges() {
    let (app, _rx) = setup();
    let mut body = worker_body(Uuid::new_v4(), "Dayo");
    body["status"] = json!("offline");
    let worker = create_worker(&app, body).await;
    let uri = format!("/workers/{}/status", worker["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(patch_request(&uri, json!({ "status": "in_transit" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(patch_request(&uri, json!({ "status": "available" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "available");

    let response = app
        .clone()
        .oneshot(patch_request(&uri, json!({ "status": "on_break" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "on_break");
}

#[tokio::test]
async fn worker_cannot_set_itself_busy() {
    let (app, _rx) = setup();
    let worker = create_worker(&app, worker_body(Uuid::new_v4(), "Efe")).await;
    let uri = format!("/workers/{}/status", worker["id"].as_str().unwrap());

    let response = app
        .oneshot(patch_request(&uri, json!({ "status": "busy" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stale_location_update_is_not_applied() {
    let (app, _rx) = setup();
    let worker = create_worker(&app, worker_body(Uuid::new_v4(), "Femi")).await;
    let uri = format!("/workers/{}/location", worker["id"].as_str().unwrap());

    let response = app
        .oneshot(patch_request(
            &uri,
            json!({
                "location": { "lat": 6.60, "lng": 3.35 },
                "recorded_at": "2001-01-01T00:00:00Z"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["worker"]["location"]["lat"], 6.5244);
}

#[tokio::test]
async fn nearby_lists_workers_within_radius() {
    let (app, _rx) = setup();
    let tenant = Uuid::new_v4();
    create_worker(&app, worker_body(tenant, "Gbenga")).await;
    let mut far = worker_body(tenant, "Hauwa");
    far["location"] = json!({ "lat": 9.0765, "lng": 7.3986 });
    create_worker(&app, far).await;

    let response = app
        .oneshot(get_request("/workers/nearby?lat=6.5244&lng=3.3800&radius_km=5"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let found = body.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["worker"]["name"], "Gbenga");
    assert!(found[0]["distance_km"].as_f64().unwrap() < 1.0);
}

#[tokio::test]
async fn rating_outside_range_returns_400() {
    let (app, _rx) = setup();
    let worker = create_worker(&app, worker_body(Uuid::new_v4(), "Ife")).await;
    let uri = format!("/workers/{}/rating", worker["id"].as_str().unwrap());

    let response = app
        .oneshot(json_request("POST", &uri, json!({ "rating": "6" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_task_queues_dispatch() {
    let (app, mut rx) = setup();
    let response = app
        .oneshot(json_request("POST", "/tasks", task_body(Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["priority"], 0);

    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let request = rx.try_recv().unwrap();
    assert_eq!(request.task_id, id);
    assert_eq!(request.attempt, 1);
}

#[tokio::test]
async fn create_task_non_positive_payout_returns_400() {
    let (app, _rx) = setup();
    let mut body = task_body(Uuid::new_v4());
    body["base_payout"] = json!("0");

    let response = app
        .oneshot(json_request("POST", "/tasks", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_task_surge_below_one_returns_400() {
    let (app, _rx) = setup();
    let mut body = task_body(Uuid::new_v4());
    body["surge_multiplier"] = json!("0.8");

    let response = app
        .oneshot(json_request("POST", "/tasks", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn task_detail_reports_surged_payout() {
    let (app, _rx) = setup();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/tasks", task_body(Uuid::new_v4())))
        .await
        .unwrap();
    let created = body_json(response).await;

    let response = app
        .oneshot(get_request(&format!(
            "/tasks/{}",
            created["id"].as_str().unwrap()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], created["id"]);
    assert_eq!(body["total_payout"], "900.00");
    assert_eq!(body["offers"].as_array().unwrap().len(), 0);
    assert!(body["allocation"].is_null());
}

#[tokio::test]
async fn cancel_pending_task_then_cancel_again_conflicts() {
    let (app, _rx) = setup();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/tasks", task_body(Uuid::new_v4())))
        .await
        .unwrap();
    let created = body_json(response).await;
    let uri = format!("/tasks/{}/cancel", created["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, json!({ "reason": "duplicate order" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    let response = app
        .oneshot(json_request("POST", &uri, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn starting_an_unallocated_task_is_forbidden() {
    let (app, _rx) = setup();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/tasks", task_body(Uuid::new_v4())))
        .await
        .unwrap();
    let created = body_json(response).await;

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/tasks/{}/start", created["id"].as_str().unwrap()),
            json!({ "worker_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let (app, _rx) = setup();
    app.clone()
        .oneshot(json_request("POST", "/tasks", task_body(Uuid::new_v4())))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/tasks?status=pending"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get_request("/tasks?status=completed"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn accepting_unknown_offer_returns_404() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/offers/{}/accept", Uuid::new_v4()),
            json!({ "worker_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn earnings_start_empty() {
    let (app, _rx) = setup();
    let worker = create_worker(&app, worker_body(Uuid::new_v4(), "Jide")).await;

    let response = app
        .oneshot(get_request(&format!(
            "/workers/{}/earnings",
            worker["id"].as_str().unwrap()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}
