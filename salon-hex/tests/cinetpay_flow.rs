//! Mobile money journeys through the CinetPay adapter, with CinetPay itself
//! replaced by a local mock API.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode},
    routing::post,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use payment_providers::{CinetPayProvider, CinetPaySettings, SettingsHandle, signature};
use salon_hex::{PaymentGateway, SessionService, inbound::HttpServer};
use salon_repo::SqliteRepo;
use salon_types::SettlementPolicy;

const ADMIN_KEY: &str = "sk_admin_cinetpay";
const SITE_ID: &str = "105900";
const SECRET: &str = "secret_test";

async fn spawn_mock_cinetpay(check_status: &'static str) -> String {
    let router = Router::new()
        .route(
            "/v2/payment",
            post(|Json(body): Json<Value>| async move {
                let token = format!("tok_{}", body["transaction_id"].as_str().unwrap_or_default());
                Json(json!({
                    "code": "201",
                    "message": "CREATED",
                    "data": {
                        "payment_token": token,
                        "payment_url": format!("https://checkout.cinetpay.test/{token}")
                    }
                }))
            }),
        )
        .route(
            "/v2/payment/check",
            post(move || async move {
                let code = if check_status == "ACCEPTED" { "00" } else { "662" };
                Json(json!({
                    "code": code,
                    "message": check_status,
                    "data": { "status": check_status }
                }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn create_app(check_status: &'static str) -> Router {
    let base = spawn_mock_cinetpay(check_status).await;
    let settings = CinetPaySettings {
        site_id: SITE_ID.into(),
        api_key: "api_key_test".into(),
        secret_key: Some(SECRET.into()),
        public_base_url: "https://salon.example.com".into(),
        api_base_url: Some(base),
        ..Default::default()
    };
    let provider = CinetPayProvider::new(Arc::new(SettingsHandle::fixed(settings)));

    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let gateway = PaymentGateway::new(SettlementPolicy::default()).with_provider(Arc::new(provider));
    let service = Arc::new(SessionService::new(repo, gateway));
    HttpServer::new(service)
        .with_admin_key(ADMIN_KEY)
        .router()
}

fn request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {ADMIN_KEY}"))
        .header("X-Forwarded-For", "203.0.113.20")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook(body: &Value, signature: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/cinetpay")
        .header("Content-Type", "application/json")
        .header("x-token", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Walks a client up to an open Wave checkout; returns (token, payment id).
async fn open_wave_payment(app: &Router) -> (String, String) {
    let (status, service) = send(
        app,
        request(
            Method::POST,
            "/api/admin/services",
            json!({ "name": "Dreadlocks", "category": "dreadlocks_new", "price_min": 15000 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, auth) = send(
        app,
        request(
            Method::POST,
            "/api/sessions/direct-auth",
            json!({
                "phone": "+2250500000000",
                "client": { "last_name": "Bamba", "first_name": "Fatou" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = auth["session"]["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        request(
            Method::POST,
            &format!("/api/sessions/{token}/service"),
            json!({ "service_id": service["id"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, payment) = send(
        app,
        request(
            Method::POST,
            &format!("/api/sessions/{token}/payment"),
            json!({ "method": "mobile_money", "operator": "wave" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "in_progress");
    assert_eq!(payment["session_status"], "payment_initiated");
    assert!(
        payment["redirect_url"]
            .as_str()
            .unwrap()
            .starts_with("https://checkout.cinetpay.test/tok_")
    );

    (token, payment["payment_id"].as_str().unwrap().to_string())
}

async fn reference_code(app: &Router, payment_id: &str) -> String {
    let (status, detail) = send(
        app,
        request(Method::GET, &format!("/api/admin/payments/{payment_id}"), Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["external_transactions"][0]["provider"], "cinetpay");
    detail["payment"]["reference_code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_signed_notification_settles_the_session() {
    let app = create_app("PENDING").await;
    let (token, payment_id) = open_wave_payment(&app).await;
    let reference = reference_code(&app, &payment_id).await;

    let body = json!({
        "cpm_site_id": SITE_ID,
        "cpm_trans_id": reference,
        "status": "ACCEPTED"
    });

    // A forged signature is acknowledged but changes nothing
    let (status, ack) = send(&app, webhook(&body, "deadbeef")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    let (_, session) = send(&app, request(Method::GET, &format!("/api/sessions/{token}"), Value::Null)).await;
    assert_eq!(session["status"], "payment_initiated");

    let signature = signature::sign(body.to_string().as_bytes(), SECRET);
    let (status, _) = send(&app, webhook(&body, &signature)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, session) = send(&app, request(Method::GET, &format!("/api/sessions/{token}"), Value::Null)).await;
    assert_eq!(session["status"], "payment_succeeded");
    assert_eq!(session["is_active"], false);

    // Redelivery is a no-op
    let (status, _) = send(&app, webhook(&body, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, detail) = send(
        &app,
        request(Method::GET, &format!("/api/admin/payments/{payment_id}"), Value::Null),
    )
    .await;
    assert_eq!(detail["payment"]["status"], "succeeded");
    assert_eq!(detail["external_transactions"].as_array().unwrap().len(), 1);
    assert_eq!(detail["external_transactions"][0]["provider_status"], "ACCEPTED");

    let (_, session) = send(&app, request(Method::GET, &format!("/api/sessions/{token}"), Value::Null)).await;
    let confirmations = session["history"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| entry["action"] == "payment_confirmation")
        .count();
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn test_unsigned_notification_is_checked_with_cinetpay() {
    let app = create_app("PENDING").await;
    let (token, payment_id) = open_wave_payment(&app).await;
    let reference = reference_code(&app, &payment_id).await;

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/cinetpay")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({
                "cpm_site_id": SITE_ID,
                "cpm_trans_id": reference,
                "status": "ACCEPTED"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, ack) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);

    // CinetPay still reports the checkout as pending
    let (_, session) = send(&app, request(Method::GET, &format!("/api/sessions/{token}"), Value::Null)).await;
    assert_eq!(session["status"], "payment_initiated");
    let (_, detail) = send(
        &app,
        request(Method::GET, &format!("/api/admin/payments/{payment_id}"), Value::Null),
    )
    .await;
    assert_eq!(detail["payment"]["status"], "in_progress");
}

#[tokio::test]
async fn test_unsigned_notification_settles_once_cinetpay_confirms() {
    let app = create_app("ACCEPTED").await;
    let (token, payment_id) = open_wave_payment(&app).await;
    let reference = reference_code(&app, &payment_id).await;

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/cinetpay")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "cpm_site_id": SITE_ID, "cpm_trans_id": reference }).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::OK);

    let (_, session) = send(&app, request(Method::GET, &format!("/api/sessions/{token}"), Value::Null)).await;
    assert_eq!(session["status"], "payment_succeeded");
}

#[tokio::test]
async fn test_refresh_polls_cinetpay() {
    let app = create_app("ACCEPTED").await;
    let (token, payment_id) = open_wave_payment(&app).await;

    let (status, detail) = send(
        &app,
        request(
            Method::POST,
            &format!("/api/admin/payments/{payment_id}/refresh"),
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["payment"]["status"], "succeeded");

    let (_, summary) = send(
        &app,
        request(Method::GET, &format!("/api/sessions/{token}/summary"), Value::Null),
    )
    .await;
    assert!(summary["message"].as_str().unwrap().starts_with("Merci Fatou"));
}

#[tokio::test]
async fn test_notification_for_unknown_transaction_is_not_found() {
    let app = create_app("PENDING").await;

    let body = json!({
        "cpm_site_id": SITE_ID,
        "cpm_trans_id": "PAY-19990101-UNKNOWN000",
        "status": "ACCEPTED"
    });
    let signature = signature::sign(body.to_string().as_bytes(), SECRET);
    let (status, _) = send(&app, webhook(&body, &signature)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
