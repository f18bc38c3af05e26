use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use roadside_dispatch::api::rest::router;
use roadside_dispatch::config::Config;
use roadside_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Clone, Copy)]
struct Who {
    id: Uuid,
    role: &'static str,
}

impl Who {
    fn customer() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "customer",
        }
    }

    fn admin() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "admin",
        }
    }

    fn mechanic(id: &str) -> Self {
        Self {
            id: id.parse().unwrap(),
            role: "mechanic",
        }
    }
}

fn setup() -> axum::Router {
    router(Arc::new(AppState::new(Config::default())))
}

fn json_request(method: &str, uri: &str, who: Option<Who>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(who) = who {
        builder = builder
            .header("x-user-id", who.id.to_string())
            .header("x-user-role", who.role);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, who: Option<Who>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(who) = who {
        builder = builder
            .header("x-user-id", who.id.to_string())
            .header("x-user-role", who.role);
    }
    builder.body(Body::empty()).unwrap()
}

fn patch_request(uri: &str, who: Who, body: Value) -> Request<Body> {
    json_request("PATCH", uri, Some(who), body)
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

fn flat_tire() -> Value {
    json!({
        "issueType": "flat_tire",
        "description": "rear tyre flat on the ring road",
        "vehicleInfo": {
            "vehicleType": "car",
            "model": "Swift",
            "plateNumber": "KA01AB1234",
            "year": 2019
        },
        "location": { "lat": 12.97, "lng": 77.59, "address": "MG Road" }
    })
}

async fn open_request(app: &axum::Router, customer: Who) -> String {
    let res = app
        .clone()
        .oneshot(json_request("POST", "/requests", Some(customer), flat_tire()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

/// Registers a mechanic near the default request location and has an admin
/// verify them.
async fn verified_mechanic(app: &axum::Router, name: &str) -> Who {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/mechanics",
            None,
            json!({
                "name": name,
                "location": { "lat": 12.98, "lng": 77.59 },
                "rating": 4.6,
                "specialties": ["tyres"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let mechanic = body_json(res).await;
    assert_eq!(mechanic["verified"], false);
    assert_eq!(mechanic["available"], true);
    let id = mechanic["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/mechanics/{id}/verification"),
            Who::admin(),
            json!({ "verified": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    Who::mechanic(&id)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["requests"], 0);
    assert_eq!(body["mechanics"], 0);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    open_request(&app, Who::customer()).await;
    let response = app.oneshot(get_request("/metrics", None)).await.unwrap();

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
    assert!(body.contains("requests_created_total 1"));
}

#[tokio::test]
async fn create_request_returns_pending() {
    let app = setup();
    let customer = Who::customer();
    let response = app
        .oneshot(json_request("POST", "/requests", Some(customer), flat_tire()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["priority"], "medium");
    assert_eq!(body["paymentStatus"], "unpaid");
    assert_eq!(body["customerId"], customer.id.to_string());
    assert!(body["assignedMechanicId"].is_null());
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_request_without_identity_returns_401() {
    let app = setup();
    let response = app
        .oneshot(json_request("POST", "/requests", None, flat_tire()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "unauthorized");
}

#[tokio::test]
async fn create_request_missing_vehicle_returns_400() {
    let app = setup();
    let mut payload = flat_tire();
    payload.as_object_mut().unwrap().remove("vehicleInfo");

    let response = app
        .oneshot(json_request("POST", "/requests", Some(Who::customer()), payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "validation_error");
}

#[tokio::test]
async fn unverified_mechanic_cannot_accept() {
    let app = setup();
    let request_id = open_request(&app, Who::customer()).await;

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/mechanics",
            None,
            json!({ "name": "New Hire", "location": { "lat": 12.97, "lng": 77.59 } }),
        ))
        .await
        .unwrap();
    let mechanic = Who::mechanic(body_json(res).await["id"].as_str().unwrap());

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            mechanic,
            json!({ "estimatedArrivalMinutes": 10 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn second_accept_is_told_the_job_was_taken() {
    let app = setup();
    let request_id = open_request(&app, Who::customer()).await;
    let first = verified_mechanic(&app, "Asha").await;
    let second = verified_mechanic(&app, "Bilal").await;

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            first,
            json!({ "estimatedArrivalMinutes": 12 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let accepted = body_json(res).await;
    assert_eq!(accepted["status"], "assigned");
    assert_eq!(accepted["assignedMechanicId"], first.id.to_string());
    assert_eq!(accepted["estimatedArrivalMinutes"], 12);
    assert_eq!(accepted["quotation"], 400.0);

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            second,
            json!({ "estimatedArrivalMinutes": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = body_json(res).await;
    assert_eq!(body["code"], "already_claimed");
    assert_eq!(body["error"], "this job was already taken");

    let res = app
        .oneshot(get_request(&format!("/mechanics/{}", first.id), None))
        .await
        .unwrap();
    let mechanic = body_json(res).await;
    assert_eq!(mechanic["available"], false);
    assert_eq!(mechanic["activeRequestId"], request_id);
}

#[tokio::test]
async fn full_service_flow() {
    let app = setup();
    let customer = Who::customer();
    let request_id = open_request(&app, customer).await;
    let mechanic = verified_mechanic(&app, "Dev").await;

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            mechanic,
            json!({ "estimatedArrivalMinutes": 15, "quotation": 650.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["quotation"], 650.0);

    for target in ["enroute", "in_progress"] {
        let res = app
            .clone()
            .oneshot(patch_request(
                &format!("/requests/{request_id}/status"),
                mechanic,
                json!({ "targetStatus": target }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], target);
    }

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/complete"),
            mechanic,
            json!({
                "workSummary": "replaced tube",
                "finalAmount": 700.0,
                "partsUsed": [{ "name": "tube", "cost": 250.0 }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let done = body_json(res).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["finalAmount"], 700.0);
    assert!(done["workDurationMinutes"].is_i64());
    let statuses: Vec<&str> = done["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|change| change["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        ["pending", "assigned", "enroute", "in_progress", "completed"]
    );

    let res = app
        .clone()
        .oneshot(get_request(&format!("/mechanics/{}", mechanic.id), None))
        .await
        .unwrap();
    let freed = body_json(res).await;
    assert_eq!(freed["available"], true);
    assert_eq!(freed["completedJobs"], 1);

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/payment"),
            customer,
            json!({ "transactionRef": "txn-42" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["paymentStatus"], "paid");

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/payment"),
            customer,
            json!({ "transactionRef": "txn-43" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn skipping_a_status_returns_400_naming_both_states() {
    let app = setup();
    let request_id = open_request(&app, Who::customer()).await;
    let mechanic = verified_mechanic(&app, "Esha").await;

    app.clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            mechanic,
            json!({ "estimatedArrivalMinutes": 8 }),
        ))
        .await
        .unwrap();

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/status"),
            mechanic,
            json!({ "targetStatus": "in_progress" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(body["error"], "cannot move request from assigned to in_progress");
}

#[tokio::test]
async fn completing_before_work_starts_is_an_invalid_transition() {
    let app = setup();
    let request_id = open_request(&app, Who::customer()).await;
    let mechanic = verified_mechanic(&app, "Kiran").await;

    app.clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            mechanic,
            json!({ "estimatedArrivalMinutes": 8 }),
        ))
        .await
        .unwrap();

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/complete"),
            mechanic,
            json!({ "workSummary": "done", "finalAmount": 300.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["code"], "invalid_transition");
    assert_eq!(body["error"], "cannot move request from assigned to completed");
}

#[tokio::test]
async fn other_mechanic_cannot_move_the_request() {
    let app = setup();
    let request_id = open_request(&app, Who::customer()).await;
    let assigned = verified_mechanic(&app, "Farah").await;
    let stranger = verified_mechanic(&app, "Gopal").await;

    app.clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            assigned,
            json!({ "estimatedArrivalMinutes": 8 }),
        ))
        .await
        .unwrap();

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/status"),
            stranger,
            json!({ "targetStatus": "enroute" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancelled_request_rejects_cancel_and_accept() {
    let app = setup();
    let customer = Who::customer();
    let request_id = open_request(&app, customer).await;
    let mechanic = verified_mechanic(&app, "Hari").await;

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/cancel"),
            customer,
            json!({ "reason": "fixed it myself" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancellationReason"], "fixed it myself");

    let res = app
        .clone()
        .oneshot(patch_request(
            &format!("/requests/{request_id}/cancel"),
            customer,
            json!({ "reason": "again" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(patch_request(
            &format!("/requests/{request_id}/accept"),
            mechanic,
            json!({ "estimatedArrivalMinutes": 8 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["code"], "not_pending");
}

#[tokio::test]
async fn list_is_scoped_to_the_customer() {
    let app = setup();
    let alice = Who::customer();
    let bob = Who::customer();
    open_request(&app, alice).await;
    open_request(&app, alice).await;
    open_request(&app, bob).await;

    let res = app
        .clone()
        .oneshot(get_request("/requests?status=pending&limit=1", Some(alice)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page = body_json(res).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let res = app
        .oneshot(get_request("/requests", Some(Who::admin())))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["total"], 3);
}

#[tokio::test]
async fn get_nonexistent_request_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/requests/{fake_id}"), Some(Who::admin())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nearby_reports_candidates_and_exclusions() {
    let app = setup();
    let near = verified_mechanic(&app, "Near").await;

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/mechanics",
            None,
            json!({ "name": "Far", "location": { "lat": 13.5, "lng": 77.59 } }),
        ))
        .await
        .unwrap();
    let far_id = body_json(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .oneshot(get_request(
            "/mechanics/nearby?lat=12.97&lng=77.59&radiusKm=10",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;

    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["mechanicId"], near.id.to_string());

    let excluded = body["excluded"].as_array().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["mechanicId"], far_id);
}

#[tokio::test]
async fn verification_is_admin_only() {
    let app = setup();
    let mechanic = verified_mechanic(&app, "Indra").await;

    let res = app
        .oneshot(patch_request(
            &format!("/mechanics/{}/verification", mechanic.id),
            mechanic,
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["code"], "not_yours");
}
