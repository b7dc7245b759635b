//! Wire-level tests for the CinetPay adapter against a local mock API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, http::StatusCode, routing::post};
use serde_json::{Value, json};

use salon_types::ports::{CustomerInfo, InitiationRequest, PaymentProvider};
use salon_types::{
    GatewayError, MobileOperator, PaymentCorrelation, PaymentId, PaymentMethod, SessionToken,
};

use crate::cinetpay::{CinetPayProvider, CinetPaySettings, normalize_status};
use crate::settings::SettingsHandle;
use crate::signature;

type Captured = Arc<Mutex<Option<Value>>>;

async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn settings(base_url: &str) -> CinetPaySettings {
    CinetPaySettings {
        site_id: "105900".into(),
        api_key: "api_key_test".into(),
        secret_key: Some("secret_test".into()),
        public_base_url: "https://salon.example.com".into(),
        api_base_url: Some(base_url.into()),
        ..Default::default()
    }
}

fn provider(settings: CinetPaySettings) -> CinetPayProvider {
    CinetPayProvider::new(Arc::new(SettingsHandle::fixed(settings)))
}

fn request() -> InitiationRequest {
    InitiationRequest {
        transaction_id: "PAY-20260101-ABCDEF1234".into(),
        amount: 5000,
        description: "Sister locks".into(),
        method: PaymentMethod::MobileMoney,
        operator: Some(MobileOperator::Wave),
        customer: CustomerInfo {
            id: "client-1".into(),
            first_name: "Awa".into(),
            last_name: "Koné".into(),
            email: None,
            phone: "+2250700000000".into(),
        },
        correlation: PaymentCorrelation {
            session_id: SessionToken::parse("session-0001").unwrap(),
            payment_id: PaymentId::new(),
            method: PaymentMethod::MobileMoney,
        },
    }
}

fn capture_router(path: &str, status: StatusCode, reply: Value) -> (Router, Captured) {
    let captured: Captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let router = Router::new().route(
        path,
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            let reply = reply.clone();
            async move {
                *sink.lock().unwrap() = Some(body);
                (status, Json(reply))
            }
        }),
    );
    (router, captured)
}

#[tokio::test]
async fn test_initiate_success_builds_expected_payload() {
    let (router, captured) = capture_router(
        "/v2/payment",
        StatusCode::OK,
        json!({
            "code": "201",
            "message": "CREATED",
            "data": {
                "payment_token": "tok_123",
                "payment_url": "https://checkout.cinetpay.com/payment/tok_123"
            }
        }),
    );
    let base = spawn_mock(router).await;
    let provider = provider(settings(&base));
    let req = request();

    let result = provider.initiate(&req).await.unwrap();
    assert_eq!(
        result.redirect_url,
        "https://checkout.cinetpay.com/payment/tok_123"
    );
    assert_eq!(result.payment_token.as_deref(), Some("tok_123"));
    assert_eq!(result.provider_transaction_id, req.transaction_id);

    let sent = captured.lock().unwrap().clone().unwrap();
    assert_eq!(sent["site_id"], "105900");
    assert_eq!(sent["apikey"], "api_key_test");
    assert_eq!(sent["amount"], 5000);
    assert_eq!(sent["currency"], "XOF");
    assert_eq!(sent["channels"], "MOBILE_MONEY");
    assert_eq!(sent["customer_surname"], "Awa");
    assert_eq!(sent["customer_country"], "CI");
    assert_eq!(
        sent["notify_url"],
        "https://salon.example.com/api/webhooks/cinetpay"
    );
    assert_eq!(
        sent["return_url"],
        "https://salon.example.com/session/session-0001/confirmation"
    );
    assert_eq!(
        PaymentCorrelation::decode(&sent["metadata"]),
        Some(req.correlation)
    );
}

#[tokio::test]
async fn test_initiate_business_refusal() {
    let (router, _) = capture_router(
        "/v2/payment",
        StatusCode::OK,
        json!({"code": "608", "message": "MINIMUM_REQUIRED_FIELDS", "description": "amount is too low"}),
    );
    let base = spawn_mock(router).await;

    let err = provider(settings(&base))
        .initiate(&request())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Provider {
            code: "608".into(),
            message: "amount is too low".into()
        }
    );
    assert!(!err.is_upstream());
}

#[tokio::test]
async fn test_initiate_http_error() {
    let (router, _) = capture_router(
        "/v2/payment",
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "boom"}),
    );
    let base = spawn_mock(router).await;

    let err = provider(settings(&base))
        .initiate(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::HttpStatus { status: 500, .. }));
    assert!(err.is_upstream());
}

#[tokio::test]
async fn test_initiate_unreachable_provider() {
    let err = provider(settings("http://127.0.0.1:1"))
        .initiate(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Network(_)));
}

#[tokio::test]
async fn test_initiate_timeout() {
    let router = Router::new().route(
        "/v2/payment",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"code": "201"}))
        }),
    );
    let base = spawn_mock(router).await;
    let mut s = settings(&base);
    s.timeout = Duration::from_millis(200);

    let err = provider(s).initiate(&request()).await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout);
}

#[tokio::test]
async fn test_initiate_without_credentials() {
    let s = CinetPaySettings {
        api_base_url: Some("http://127.0.0.1:1".into()),
        ..Default::default()
    };
    let err = provider(s).initiate(&request()).await.unwrap_err();
    assert_eq!(err, GatewayError::NotConfigured("cinetpay".into()));
}

#[tokio::test]
async fn test_check_status_accepted() {
    let correlation = request().correlation;
    let (router, captured) = capture_router(
        "/v2/payment/check",
        StatusCode::OK,
        json!({
            "code": "00",
            "message": "SUCCES",
            "data": {"status": "ACCEPTED", "metadata": correlation.encode()}
        }),
    );
    let base = spawn_mock(router).await;

    let result = provider(settings(&base))
        .check_status("PAY-20260101-ABCDEF1234")
        .await
        .unwrap();
    assert_eq!(result.status, "completed");
    assert_eq!(result.provider_status, "ACCEPTED");
    assert_eq!(result.correlation, Some(correlation));

    let sent = captured.lock().unwrap().clone().unwrap();
    assert_eq!(sent["transaction_id"], "PAY-20260101-ABCDEF1234");
}

#[tokio::test]
async fn test_check_status_refused_and_waiting() {
    let (router, _) = capture_router(
        "/v2/payment/check",
        StatusCode::OK,
        json!({"code": "600", "message": "PAYMENT_FAILED", "data": {"status": "REFUSED"}}),
    );
    let base = spawn_mock(router).await;
    let result = provider(settings(&base)).check_status("tx").await.unwrap();
    assert_eq!(result.status, "failed");
    assert_eq!(result.correlation, None);

    let (router, _) = capture_router(
        "/v2/payment/check",
        StatusCode::OK,
        json!({"code": 662, "message": "WAITING_CUSTOMER_PAYMENT"}),
    );
    let base = spawn_mock(router).await;
    let result = provider(settings(&base)).check_status("tx").await.unwrap();
    assert_eq!(result.status, "pending");
    assert_eq!(result.provider_status, "662");
}

#[test]
fn test_callback_site_id_check() {
    let provider = provider(settings("http://127.0.0.1:1"));

    let body = br#"{"cpm_site_id":"105900","cpm_trans_id":"PAY-1","status":"completed"}"#;
    let callback = provider.parse_callback(body, None).unwrap();
    assert_eq!(callback.provider_transaction_id, "PAY-1");
    assert!(provider.verify_callback(&callback));

    let foreign = br#"{"cpm_site_id":"999","cpm_trans_id":"PAY-1","status":"completed"}"#;
    let callback = provider.parse_callback(foreign, None).unwrap();
    assert!(!provider.verify_callback(&callback));
}

#[test]
fn test_callback_signature_check() {
    let provider = provider(settings("http://127.0.0.1:1"));
    let body = br#"{"cpm_site_id":"105900","cpm_trans_id":"PAY-1","status":"completed"}"#;

    let good = signature::sign(body, "secret_test");
    let callback = provider.parse_callback(body, Some(&good)).unwrap();
    assert_eq!(callback.status.as_deref(), Some("completed"));
    assert!(provider.verify_callback(&callback));

    let bad = signature::sign(body, "another_secret");
    let callback = provider.parse_callback(body, Some(&bad)).unwrap();
    assert!(!provider.verify_callback(&callback));
}

#[test]
fn test_unsigned_callback_status_is_not_trusted() {
    let provider = provider(settings("http://127.0.0.1:1"));
    let body = br#"{"cpm_site_id":"105900","cpm_trans_id":"PAY-1","status":"ACCEPTED"}"#;
    let callback = provider.parse_callback(body, None).unwrap();
    assert!(provider.verify_callback(&callback));
    assert_eq!(callback.status, None);
}

#[test]
fn test_unsigned_callback_rejected_when_required() {
    let mut s = settings("http://127.0.0.1:1");
    s.require_signature = true;
    let provider = provider(s);
    let body = br#"{"cpm_site_id":"105900","cpm_trans_id":"PAY-1"}"#;
    let callback = provider.parse_callback(body, None).unwrap();
    assert!(!provider.verify_callback(&callback));
}

#[test]
fn test_callback_parsing_variants() {
    let provider = provider(settings("http://127.0.0.1:1"));
    let correlation = request().correlation;

    let body = json!({
        "site_id": 105900,
        "transaction_id": "PAY-2",
        "status": "ACCEPTED",
        "metadata": serde_json::to_value(&correlation).unwrap(),
    })
    .to_string();
    let callback = provider.parse_callback(body.as_bytes(), None).unwrap();
    assert_eq!(callback.site_id.as_deref(), Some("105900"));
    assert_eq!(callback.correlation, Some(correlation));

    assert!(provider.parse_callback(b"not json", None).is_err());
    assert!(provider.parse_callback(br#"{"cpm_site_id":"105900"}"#, None).is_err());
}

#[test]
fn test_reload_swaps_settings() {
    let source = Arc::new(Mutex::new(settings("http://127.0.0.1:1")));
    let reader = source.clone();
    let handle = SettingsHandle::with_loader(move || Ok(reader.lock().unwrap().clone())).unwrap();
    let provider = CinetPayProvider::new(Arc::new(handle));

    source.lock().unwrap().site_id = "200000".into();
    assert_eq!(provider.settings().site_id, "105900");
    provider.reload().unwrap();
    assert_eq!(provider.settings().site_id, "200000");
}

#[test]
fn test_status_normalization() {
    assert_eq!(normalize_status("ACCEPTED"), "completed");
    assert_eq!(normalize_status("REFUSED"), "failed");
    assert_eq!(normalize_status("CANCELED"), "cancelled");
    assert_eq!(normalize_status("completed"), "completed");
    assert_eq!(normalize_status("WAITING"), "waiting");
}
