//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use salon_types::{
    AppError, ClientResponse, DirectAuthRequest, DirectAuthResponse, ExpireSessionsResponse,
    GatewayError, IdentifyClientRequest, IdentifyClientResponse, InitiatePaymentRequest,
    InitiatePaymentResponse, NewService, PaymentDetailResponse, PaymentId, PaymentResponse,
    PaymentStatus, ReloadProvidersResponse, SalonRepository, SelectServiceRequest,
    ServiceResponse, SessionResponse, StartSessionRequest, WebhookAck,
};

use crate::service::{PaymentDetail, PaymentInitiation, RequestContext, SessionService};
use crate::summary::Locale;

/// Sessions expired per admin sweep request.
const ADMIN_EXPIRY_BATCH: i64 = 500;

/// Application state shared across handlers.
pub struct AppState<R: SalonRepository> {
    pub service: Arc<SessionService<R>>,
    /// SHA-256 of the admin API key; admin routes are closed when unset.
    pub admin_key_hash: Option<String>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation(_)
            | AppError::InvalidTransition { .. }
            | AppError::SessionInactive(_)
            | AppError::Constraint(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway(e) if e.is_upstream() => StatusCode::BAD_GATEWAY,
            AppError::Gateway(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// Caller address (first `X-Forwarded-For` hop, else `X-Real-IP`).
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        ip_address: client_ip(headers),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

fn parse_payment_id(id: &str) -> Result<PaymentId, AppError> {
    id.parse()
        .map_err(|_| AppError::Validation("Invalid payment ID".into()))
}

fn payment_detail_response(detail: PaymentDetail) -> PaymentDetailResponse {
    PaymentDetailResponse {
        payment: PaymentResponse::from(&detail.payment),
        session_id: detail.session_token,
        external_transactions: detail
            .external_transactions
            .iter()
            .map(Into::into)
            .collect(),
    }
}

fn initiation_response(initiation: PaymentInitiation) -> InitiatePaymentResponse {
    let message = match (&initiation.redirect_url, initiation.payment.status) {
        (_, PaymentStatus::Succeeded) => format!(
            "{} payment of {} FCFA confirmed",
            initiation.payment.method_label(),
            initiation.payment.amount
        ),
        (Some(_), _) => "Continue to the payment page to complete your payment".to_string(),
        (None, _) => "Payment recorded".to_string(),
    };
    InitiatePaymentResponse {
        payment_id: initiation.payment.id,
        status: initiation.payment.status,
        session_status: initiation.session.status,
        redirect_url: initiation.redirect_url,
        message,
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session journey
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, headers))]
pub async fn start_session<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .service
        .start_session(req, request_context(&headers))
        .await?;
    let now = chrono::Utc::now();
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse::from_session(&session, now)),
    ))
}

#[tracing::instrument(skip(state, headers), fields(phone = %req.phone))]
pub async fn direct_auth<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    Json(req): Json<DirectAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identified = state
        .service
        .direct_auth(req, request_context(&headers))
        .await?;
    let redirect_url = format!("/session/{}", identified.session.token);
    let now = chrono::Utc::now();
    Ok(Json(DirectAuthResponse {
        session: SessionResponse::from_session(&identified.session, now),
        client: ClientResponse::from(&identified.client),
        created: identified.created,
        redirect_url,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_session<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.service.get_session(&token).await?;
    let now = chrono::Utc::now();
    Ok(Json(
        SessionResponse::from_session(&detail.session, now).with_history(&detail.history),
    ))
}

#[tracing::instrument(skip(state, headers), fields(phone = %req.phone))]
pub async fn identify_client<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(req): Json<IdentifyClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identified = state
        .service
        .identify_client(&token, req, request_context(&headers))
        .await?;
    let now = chrono::Utc::now();
    Ok(Json(IdentifyClientResponse {
        session: SessionResponse::from_session(&identified.session, now),
        client: ClientResponse::from(&identified.client),
        created: identified.created,
    }))
}

#[tracing::instrument(skip(state, headers), fields(service_id = %req.service_id))]
pub async fn select_service<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SelectServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .service
        .select_service(&token, req, request_context(&headers))
        .await?;
    Ok(Json(SessionResponse::from_session(
        &session,
        chrono::Utc::now(),
    )))
}

#[tracing::instrument(skip(state, headers), fields(method = %req.method))]
pub async fn initiate_payment<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let initiation = state
        .service
        .initiate_payment(&token, req, request_context(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(initiation_response(initiation))))
}

#[tracing::instrument(skip(state, headers))]
pub async fn abandon<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .service
        .abandon(&token, request_context(&headers))
        .await?;
    Ok(Json(SessionResponse::from_session(
        &session,
        chrono::Utc::now(),
    )))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub lang: Option<String>,
}

#[tracing::instrument(skip(state))]
pub async fn summary<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(token): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let locale = match query.lang.as_deref() {
        Some(lang) => lang.parse::<Locale>().map_err(AppError::from)?,
        None => Locale::default(),
    };
    let summary = state.service.summarize(&token, locale).await?;
    Ok(Json(summary))
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn list_services<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let services = state.service.list_services(true).await?;
    let response: Vec<ServiceResponse> = services.iter().map(ServiceResponse::from).collect();
    Ok(Json(response))
}

#[tracing::instrument(skip(state), fields(name = %req.name))]
pub async fn create_service<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<NewService>,
) -> Result<impl IntoResponse, ApiError> {
    let service = state.service.create_service(req).await?;
    Ok((StatusCode::CREATED, Json(ServiceResponse::from(&service))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Provider callback. Every delivery that reached a known payment (or was
/// discarded as unauthentic) is acknowledged so providers stop retrying.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn provider_webhook<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("x-token")
        .or_else(|| headers.get("x-signature"))
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .service
        .handle_callback(&provider, &body, signature, client_ip(&headers))
        .await
        .map_err(|e| match e {
            AppError::Gateway(GatewayError::UnknownProvider(name)) => {
                AppError::NotFound(format!("Payment provider {name}"))
            }
            other => other,
        })?;

    tracing::debug!(?outcome, "Callback handled");
    Ok(Json(WebhookAck { received: true }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Administration
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn payment_detail<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.service.payment_detail(parse_payment_id(&id)?).await?;
    Ok(Json(payment_detail_response(detail)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn refresh_payment<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.service.refresh_payment(parse_payment_id(&id)?).await?;
    Ok(Json(payment_detail_response(detail)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn cancel_payment<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.service.cancel_payment(parse_payment_id(&id)?).await?;
    Ok(Json(payment_detail_response(detail)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn delete_payment<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_payment(parse_payment_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
pub async fn expire_sessions<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let expired = state
        .service
        .expire_stale_sessions(ADMIN_EXPIRY_BATCH)
        .await?;
    Ok(Json(ExpireSessionsResponse { expired }))
}

#[tracing::instrument(skip(state))]
pub async fn reload_providers<R: SalonRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let reloaded = state.service.reload_providers();
    Ok(Json(ReloadProvidersResponse { reloaded }))
}
