//! # Salon Client SDK
//!
//! A typed Rust client for the salon payment-session API.

use reqwest::{Client, RequestBuilder};
use salon_types::{
    DirectAuthRequest, DirectAuthResponse, ExpireSessionsResponse, IdentifyClientRequest,
    IdentifyClientResponse, InitiatePaymentRequest, InitiatePaymentResponse, MobileOperator,
    NewClient, NewService, PaymentDetailResponse, PaymentId, PaymentMethod,
    ReloadProvidersResponse, SelectServiceRequest, ServiceId, ServiceResponse, SessionResponse,
    SessionSummary, StartSessionRequest,
};
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Salon API client.
pub struct SalonClient {
    base_url: String,
    admin_key: Option<String>,
    http: Client,
}

impl SalonClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: None,
            http: Client::new(),
        }
    }

    /// Sets the admin API key sent on admin routes.
    pub fn with_admin_key(mut self, admin_key: impl Into<String>) -> Self {
        self.admin_key = Some(admin_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self.http.get(self.url("/health")).send().await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Client journey
    // ─────────────────────────────────────────────────────────────────────────

    /// Opens a session, optionally with a token printed on the QR code.
    pub async fn start_session(
        &self,
        session_id: Option<String>,
        device: Option<String>,
    ) -> Result<SessionResponse, ClientError> {
        let req = StartSessionRequest { session_id, device };
        self.send(self.http.post(self.url("/api/sessions")).json(&req))
            .await
    }

    /// Opens (or resumes) a session and identifies the client in one call.
    pub async fn direct_auth(
        &self,
        phone: &str,
        client: Option<NewClient>,
        session_id: Option<String>,
    ) -> Result<DirectAuthResponse, ClientError> {
        let req = DirectAuthRequest {
            phone: phone.to_string(),
            client,
            session_id,
        };
        self.send(self.http.post(self.url("/api/sessions/direct-auth")).json(&req))
            .await
    }

    /// Gets a session with its history.
    pub async fn get_session(&self, token: &str) -> Result<SessionResponse, ClientError> {
        self.send(self.http.get(self.url(&format!("/api/sessions/{token}"))))
            .await
    }

    /// Identifies the client by phone, registering them when `client` is given.
    pub async fn identify_client(
        &self,
        token: &str,
        phone: &str,
        client: Option<NewClient>,
    ) -> Result<IdentifyClientResponse, ClientError> {
        let req = IdentifyClientRequest {
            phone: phone.to_string(),
            client,
        };
        self.send(
            self.http
                .post(self.url(&format!("/api/sessions/{token}/identify")))
                .json(&req),
        )
        .await
    }

    /// Selects the service; `amount` is required for price bands.
    pub async fn select_service(
        &self,
        token: &str,
        service_id: ServiceId,
        amount: Option<i64>,
    ) -> Result<SessionResponse, ClientError> {
        let req = SelectServiceRequest { service_id, amount };
        self.send(
            self.http
                .post(self.url(&format!("/api/sessions/{token}/service")))
                .json(&req),
        )
        .await
    }

    /// Initiates the payment.
    pub async fn initiate_payment(
        &self,
        token: &str,
        method: PaymentMethod,
        operator: Option<MobileOperator>,
    ) -> Result<InitiatePaymentResponse, ClientError> {
        let req = InitiatePaymentRequest { method, operator };
        self.send(
            self.http
                .post(self.url(&format!("/api/sessions/{token}/payment")))
                .json(&req),
        )
        .await
    }

    pub async fn abandon(&self, token: &str) -> Result<SessionResponse, ClientError> {
        self.send(
            self.http
                .post(self.url(&format!("/api/sessions/{token}/abandon"))),
        )
        .await
    }

    /// End-of-journey summary; `lang` is `fr` (default) or `en`.
    pub async fn summary(
        &self,
        token: &str,
        lang: Option<&str>,
    ) -> Result<SessionSummary, ClientError> {
        let mut req = self
            .http
            .get(self.url(&format!("/api/sessions/{token}/summary")));
        if let Some(lang) = lang {
            req = req.query(&[("lang", lang)]);
        }
        self.send(req).await
    }

    /// Lists the active services.
    pub async fn list_services(&self) -> Result<Vec<ServiceResponse>, ClientError> {
        self.send(self.http.get(self.url("/api/services"))).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_service(&self, service: &NewService) -> Result<ServiceResponse, ClientError> {
        self.send(self.admin(self.http.post(self.url("/api/admin/services")).json(service)))
            .await
    }

    pub async fn payment_detail(&self, id: PaymentId) -> Result<PaymentDetailResponse, ClientError> {
        self.send(self.admin(self.http.get(self.url(&format!("/api/admin/payments/{id}")))))
            .await
    }

    /// Polls the provider and applies its answer.
    pub async fn refresh_payment(
        &self,
        id: PaymentId,
    ) -> Result<PaymentDetailResponse, ClientError> {
        self.send(self.admin(
            self.http
                .post(self.url(&format!("/api/admin/payments/{id}/refresh"))),
        ))
        .await
    }

    pub async fn cancel_payment(
        &self,
        id: PaymentId,
    ) -> Result<PaymentDetailResponse, ClientError> {
        self.send(self.admin(
            self.http
                .post(self.url(&format!("/api/admin/payments/{id}/cancel"))),
        ))
        .await
    }

    /// Deletes a payment that never reached a provider.
    pub async fn delete_payment(&self, id: PaymentId) -> Result<(), ClientError> {
        let resp = self
            .admin(
                self.http
                    .delete(self.url(&format!("/api/admin/payments/{id}"))),
            )
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(api_error(resp).await)
        }
    }

    /// Expires overdue sessions now instead of waiting for the sweep.
    pub async fn expire_sessions(&self) -> Result<ExpireSessionsResponse, ClientError> {
        self.send(self.admin(self.http.post(self.url("/api/admin/sessions/expire"))))
            .await
    }

    pub async fn reload_providers(&self) -> Result<ReloadProvidersResponse, ClientError> {
        self.send(self.admin(self.http.post(self.url("/api/admin/providers/reload"))))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn admin(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.admin_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if resp.status().is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(api_error(resp).await)
        }
    }
}

async fn api_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ClientError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    }
}

/// Pulls `error` out of the API's `{"error", "code"}` body, falling back to
/// the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
