mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{seed_property, setup};
use ed25519_dalek::SigningKey;
use estate::auth::{create_jwt, Role, TokenVerifier};
use estate::routes::{router, AppState};
use estate::{PurchaseLimits, PurchaseService};
use http_body_util::BodyExt;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    db: estate::Database,
    signing_key: SigningKey,
}

impl TestApp {
    async fn new() -> Self {
        let db = setup().await;
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifier =
            TokenVerifier::from_public_key_hex(&hex::encode(signing_key.verifying_key().to_bytes()))
                .unwrap();
        let state = Arc::new(AppState {
            db: db.clone(),
            purchases: PurchaseService::new(db.clone(), PurchaseLimits::default()),
            verifier,
        });
        Self {
            app: router(state),
            db,
            signing_key,
        }
    }

    fn token(&self, user_id: &str, role: Role) -> String {
        create_jwt(&self.signing_key.to_bytes(), user_id, role, 3600).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_purchase_requires_token() {
    let app = TestApp::new().await;
    let property = seed_property(&app.db, "Garden flat", 10, 5000).await;

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            None,
            json!({ "property_id": property.id, "quantity": 1, "paypal_transaction_id": "PAY-1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app
        .send(post_json(
            "/api/purchase",
            Some("not-a-jwt"),
            json!({ "property_id": property.id, "quantity": 1, "paypal_transaction_id": "PAY-1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_purchase_over_http() {
    let app = TestApp::new().await;
    let property = seed_property(&app.db, "Garden flat", 10, 5000).await;
    let token = app.token("user-a", Role::User);

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            Some(&token),
            json!({ "property_id": property.id, "quantity": 3, "paypal_transaction_id": "PAY-1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["amount_cents"], 15_000);
    assert_eq!(body["chip_serials"].as_array().map(|s| s.len()), Some(3));

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            Some(&token),
            json!({ "property_id": property.id, "quantity": 8, "paypal_transaction_id": "PAY-2" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_inventory");

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            Some(&token),
            json!({ "property_id": property.id, "quantity": 1, "paypal_transaction_id": "PAY-1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_payment");

    let (status, body) = app.send(get("/api/portfolio", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_chips"], 3);
    assert_eq!(body["total_invested_cents"], 15_000);

    let (status, body) = app.send(get("/api/badges", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["badge_key"], "first_purchase");
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = TestApp::new().await;
    let property = seed_property(&app.db, "Garden flat", 10, 5000).await;
    let token = app.token("user-a", Role::User);

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            Some(&token),
            json!({ "property_id": property.id, "quantity": 3 }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("paypal_transaction_id"));

    let (status, body) = app
        .send(post_json(
            "/api/purchase",
            Some(&token),
            json!({
                "property_id": property.id,
                "quantity": "three",
                "paypal_transaction_id": "PAY-1"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let garbage = Request::post("/api/purchase")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(garbage).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, portfolio) = app.send(get("/api/portfolio", Some(&token))).await;
    assert_eq!(portfolio["total_chips"], 0);
}

#[tokio::test]
async fn test_assign_chips_for_another_user_needs_admin() {
    let app = TestApp::new().await;
    let property = seed_property(&app.db, "Garden flat", 10, 5000).await;
    let body = json!({
        "property_id": property.id,
        "user_id": "user-b",
        "quantity": 2,
        "paypal_transaction_id": "PAY-9"
    });

    let user_token = app.token("user-a", Role::User);
    let (status, reply) = app
        .send(post_json("/api/assign-chips", Some(&user_token), body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply["error"], "forbidden");

    let admin_token = app.token("admin-1", Role::Admin);
    let (status, reply) = app
        .send(post_json("/api/assign-chips", Some(&admin_token), body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["buyer_id"], "user-b");
}

#[tokio::test]
async fn test_admin_onboards_property() {
    let app = TestApp::new().await;
    let new_property = json!({
        "title": "Cliff house",
        "total_chips": 25,
        "price_per_chip_cents": 4000,
        "serial_prefix": "CLF"
    });

    let user_token = app.token("user-a", Role::User);
    let (status, _) = app
        .send(post_json("/api/admin/properties", Some(&user_token), new_property.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_token = app.token("admin-1", Role::Admin);
    let (status, created) = app
        .send(post_json("/api/admin/properties", Some(&admin_token), new_property))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["available_chips"], 25);
    assert_eq!(created["total_value_cents"], 100_000);

    let id = created["id"].as_str().unwrap().to_string();
    let (status, fetched) = app.send(get(&format!("/api/properties/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Cliff house");

    let (status, listed) = app.send(get("/api/properties", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(|p| p.len()), Some(1));

    let (status, report) = app
        .send(post_json(
            &format!("/api/admin/properties/{}/reconcile", id),
            Some(&admin_token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["corrected"], false);

    let (status, body) = app.send(get("/api/properties/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_vote_over_http() {
    let app = TestApp::new().await;
    let property = seed_property(&app.db, "Garden flat", 10, 5000).await;
    let holder = app.token("user-a", Role::User);
    let admin = app.token("admin-1", Role::Admin);

    app.send(post_json(
        "/api/purchase",
        Some(&holder),
        json!({ "property_id": property.id, "quantity": 4, "paypal_transaction_id": "PAY-V" }),
    ))
    .await;

    let ends_at = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let (status, vote) = app
        .send(post_json(
            "/api/admin/votes",
            Some(&admin),
            json!({
                "property_id": property.id,
                "title": "Solar panels",
                "ends_at": ends_at,
                "options": ["Install", "Skip"]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let vote_id = vote["id"].as_str().unwrap().to_string();
    let install = vote["options"][0]["id"].as_str().unwrap().to_string();

    let (status, cast) = app
        .send(post_json(
            &format!("/api/votes/{}/cast", vote_id),
            Some(&holder),
            json!({ "option_id": install }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cast["weight"], 4);

    let outsider = app.token("user-z", Role::User);
    let (status, _) = app
        .send(post_json(
            &format!("/api/votes/{}/cast", vote_id),
            Some(&outsider),
            json!({ "option_id": install }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, tally) = app
        .send(get(&format!("/api/votes/{}/tally", vote_id), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tally["total_weight"], 4);
    assert_eq!(tally["options"][0]["weight"], 4);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new().await;

    let (status, body) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app.app.clone().oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("estate_http_requests_total"));
}
