use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::{Value, json};
use tower::ServiceExt;

use rocketry_api::auth::AppStateInner;
use rocketry_api::stripe::{DEFAULT_TOLERANCE_SECS, WebhookVerifier};
use rocketry_api::token::TokenService;
use rocketry_db::Database;
use rocketry_types::models::NewCourse;

const WEBHOOK_SECRET: &str = "whsec_integration";

fn app() -> Router {
    let db = Database::open_in_memory().unwrap();
    for (slug, price_cents) in [("intro-to-rocketry", 0), ("advanced-propulsion", 4500)] {
        db.upsert_course(&NewCourse {
            slug: slug.into(),
            title: slug.replace('-', " "),
            description: String::new(),
            price_cents,
        })
        .unwrap();
    }

    let state = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(b"integration-secret", Algorithm::HS256, Duration::minutes(60)).unwrap(),
        webhooks: WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE_SECS),
    });
    rocketry_api::router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        post_json(
            "/api/auth/register",
            json!({ "email": email, "full_name": "Test Student", "password": "launchpad42" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        post_json("/api/auth/login", json!({ "email": email, "password": "launchpad42" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let (status, body) = send(&app(), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn register_login_and_fetch_profile() {
    let app = app();
    let token = register_and_login(&app, "student@gla.ac.uk").await;

    let (status, body) = send(&app, get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "student@gla.ac.uk");
    assert_eq!(body["is_active"], true);
    assert!(body.get("hashed_password").is_none());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register_and_login(&app, "dup@gla.ac.uk").await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "email": "dup@gla.ac.uk", "password": "different-pass" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_password_is_a_validation_error() {
    let (status, body) = send(
        &app(),
        post_json("/api/auth/register", json!({ "email": "a@b.com", "password": "short" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("at least 8"));
}

#[tokio::test]
async fn auth_failures_share_one_response() {
    let app = app();
    register_and_login(&app, "a@b.com").await;

    let (missing_status, missing_body) = send(&app, get("/api/users/me", None)).await;
    let (garbage_status, garbage_body) = send(&app, get("/api/users/me", Some("garbage"))).await;
    let (login_status, login_body) = send(
        &app,
        post_json("/api/auth/login", json!({ "email": "a@b.com", "password": "wrong-password" }), None),
    )
    .await;

    for status in [missing_status, garbage_status, login_status] {
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(missing_body, garbage_body);
    assert_eq!(garbage_body, login_body);
    assert_eq!(login_body["detail"], "Could not validate credentials");
}

#[tokio::test]
async fn catalog_lists_courses_and_sponsors() {
    let app = app();
    let (status, courses) = send(&app, get("/api/courses", None)).await;
    assert_eq!(status, StatusCode::OK);
    let slugs: Vec<&str> = courses
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["intro-to-rocketry", "advanced-propulsion"]);

    let (status, sponsors) = send(&app, get("/api/sponsors", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sponsors, json!([]));
}

#[tokio::test]
async fn paid_course_flow_is_settled_by_webhook() {
    let app = app();
    let token = register_and_login(&app, "payer@gla.ac.uk").await;

    let (_, courses) = send(&app, get("/api/courses", None)).await;
    let paid_course = courses
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["price_cents"] != 0)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let (status, enrollment) = send(
        &app,
        post_json(&format!("/api/courses/{paid_course}/enroll"), json!({}), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(enrollment["paid"], false);
    let enrollment_id = enrollment["id"].as_i64().unwrap();

    let event = json!({
        "id": "evt_integration_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "payment_status": "paid",
            "metadata": { "enrollment_id": enrollment_id.to_string() }
        }}
    })
    .to_string();
    let t = Utc::now().timestamp();
    let sig = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE_SECS)
        .sign(t, event.as_bytes())
        .unwrap();

    for _ in 0..2 {
        let req = Request::post("/webhooks/stripe")
            .header("Stripe-Signature", format!("t={t},v1={sig}"))
            .body(Body::from(event.clone()))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));
    }

    let (status, mine) = send(&app, get("/api/users/me/enrollments", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["paid"], true);
    assert_eq!(mine[0]["course"]["id"], paid_course);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = app();
    let req = Request::post("/webhooks/stripe")
        .header("Stripe-Signature", format!("t={},v1={}", Utc::now().timestamp(), "00".repeat(32)))
        .body(Body::from(r#"{"id":"evt_x","type":"payment_intent.succeeded"}"#))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::post("/webhooks/stripe").body(Body::from("{}")).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn enrolling_in_missing_course_is_not_found() {
    let app = app();
    let token = register_and_login(&app, "a@b.com").await;
    let (status, body) = send(&app, post_json("/api/courses/999/enroll", json!({}), Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Course not found");
}

#[tokio::test]
async fn undecodable_requests_use_the_error_body() {
    let app = app();

    let broken = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let (status, body) = send(&app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let untyped = Request::post("/api/auth/register")
        .body(Body::from(json!({ "email": "a@b.com", "password": "launchpad42" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, untyped).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["detail"].is_string());

    let (status, body) = send(
        &app,
        post_json("/api/auth/register", json!({ "email": "a@b.com", "password": 42 }), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());

    let token = register_and_login(&app, "path@gla.ac.uk").await;
    let (status, body) = send(&app, post_json("/api/courses/not-a-number/enroll", json!({}), Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}
