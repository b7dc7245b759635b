//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use salon_types::domain::{Gender, NewClient, NewService};
use salon_types::dto::{
    ClientResponse, DirectAuthRequest, DirectAuthResponse, ExpireSessionsResponse,
    ExternalTransactionResponse, HistoryEntryResponse, IdentifyClientRequest,
    IdentifyClientResponse, InitiatePaymentRequest, InitiatePaymentResponse,
    PaymentDetailResponse, PaymentResponse, ReloadProvidersResponse, SelectServiceRequest,
    ServiceResponse, SessionResponse, SessionSummary, StartSessionRequest, WebhookAck,
};
use salon_types::{
    ClientId, HistoryAction, MobileOperator, PaymentId, PaymentMethod, PaymentStatus,
    ServiceCategory, ServiceId, SessionStatus,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Open a session after a QR code scan
#[utoipa::path(
    post,
    path = "/api/sessions",
    tag = "sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionResponse),
        (status = 400, description = "Malformed session token"),
        (status = 409, description = "Session token already in use"),
        (status = 429, description = "Rate limit exceeded")
    )
)]
async fn start_session() {}

/// Open (or resume) a session and identify the client in one step
#[utoipa::path(
    post,
    path = "/api/sessions/direct-auth",
    tag = "sessions",
    request_body = DirectAuthRequest,
    responses(
        (status = 200, description = "Client identified", body = DirectAuthResponse),
        (status = 400, description = "Invalid phone number or missing client details")
    )
)]
async fn direct_auth() {}

/// Session state with its history
#[utoipa::path(
    get,
    path = "/api/sessions/{token}",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Session details", body = SessionResponse),
        (status = 404, description = "Session not found")
    )
)]
async fn get_session() {}

/// Identify the client by phone number, registering them if unknown
#[utoipa::path(
    post,
    path = "/api/sessions/{token}/identify",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    request_body = IdentifyClientRequest,
    responses(
        (status = 200, description = "Client identified", body = IdentifyClientResponse),
        (status = 400, description = "Invalid phone, missing client details, inactive session or illegal transition"),
        (status = 404, description = "Session not found")
    )
)]
async fn identify_client() {}

/// Select the service and agree on the amount
#[utoipa::path(
    post,
    path = "/api/sessions/{token}/service",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    request_body = SelectServiceRequest,
    responses(
        (status = 200, description = "Service selected", body = SessionResponse),
        (status = 400, description = "Amount outside the price band or illegal transition"),
        (status = 404, description = "Session, client or service not found")
    )
)]
async fn select_service() {}

/// Initiate the payment
#[utoipa::path(
    post,
    path = "/api/sessions/{token}/payment",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    request_body = InitiatePaymentRequest,
    responses(
        (status = 201, description = "Payment settled or checkout opened", body = InitiatePaymentResponse),
        (status = 400, description = "Invalid method/operator, illegal transition or provider refusal"),
        (status = 404, description = "Session not found"),
        (status = 502, description = "Payment provider unreachable")
    )
)]
async fn initiate_payment() {}

/// Abandon the session
#[utoipa::path(
    post,
    path = "/api/sessions/{token}/abandon",
    tag = "sessions",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Session abandoned", body = SessionResponse),
        (status = 400, description = "Session cannot be abandoned from its current status"),
        (status = 404, description = "Session not found")
    )
)]
async fn abandon() {}

/// End-of-journey summary with a thank-you message
#[utoipa::path(
    get,
    path = "/api/sessions/{token}/summary",
    tag = "sessions",
    params(
        ("token" = String, Path, description = "Session token"),
        ("lang" = Option<String>, Query, description = "Message language (fr, en)")
    ),
    responses(
        (status = 200, description = "Session summary", body = SessionSummary),
        (status = 404, description = "Session not found")
    )
)]
async fn summary() {}

/// Active service catalog
#[utoipa::path(
    get,
    path = "/api/services",
    tag = "catalog",
    responses(
        (status = 200, description = "Active services", body = Vec<ServiceResponse>)
    )
)]
async fn list_services() {}

/// Payment provider notification
#[utoipa::path(
    post,
    path = "/api/webhooks/{provider}",
    tag = "webhooks",
    params(
        ("provider" = String, Path, description = "Provider name (cinetpay, paydunya)"),
        ("x-token" = Option<String>, Header, description = "Provider signature")
    ),
    request_body = inline(serde_json::Value),
    responses(
        (status = 200, description = "Notification received", body = WebhookAck),
        (status = 404, description = "Unknown provider or payment")
    )
)]
async fn provider_webhook() {}

/// Register a catalog service
#[utoipa::path(
    post,
    path = "/api/admin/services",
    tag = "admin",
    request_body = NewService,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Service created", body = ServiceResponse),
        (status = 400, description = "Invalid price band"),
        (status = 401, description = "Unauthorized")
    )
)]
async fn create_service() {}

/// Payment with its provider records
#[utoipa::path(
    get,
    path = "/api/admin/payments/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = PaymentId, Path, description = "Payment ID (UUID)")),
    responses(
        (status = 200, description = "Payment details", body = PaymentDetailResponse),
        (status = 404, description = "Payment not found"),
        (status = 401, description = "Unauthorized")
    )
)]
async fn payment_detail() {}

/// Poll the provider and reconcile the payment
#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/refresh",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = PaymentId, Path, description = "Payment ID (UUID)")),
    responses(
        (status = 200, description = "Payment reconciled", body = PaymentDetailResponse),
        (status = 400, description = "Payment never reached a provider"),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Payment provider unreachable")
    )
)]
async fn refresh_payment() {}

/// Cancel a payment that has not settled
#[utoipa::path(
    post,
    path = "/api/admin/payments/{id}/cancel",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = PaymentId, Path, description = "Payment ID (UUID)")),
    responses(
        (status = 200, description = "Payment cancelled", body = PaymentDetailResponse),
        (status = 400, description = "Payment already settled"),
        (status = 404, description = "Payment not found")
    )
)]
async fn cancel_payment() {}

/// Delete a payment without provider records
#[utoipa::path(
    delete,
    path = "/api/admin/payments/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = PaymentId, Path, description = "Payment ID (UUID)")),
    responses(
        (status = 204, description = "Payment deleted"),
        (status = 400, description = "Payment still referenced by provider records"),
        (status = 404, description = "Payment not found")
    )
)]
async fn delete_payment() {}

/// Expire overdue sessions now
#[utoipa::path(
    post,
    path = "/api/admin/sessions/expire",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sessions expired", body = ExpireSessionsResponse),
        (status = 401, description = "Unauthorized")
    )
)]
async fn expire_sessions() {}

/// Reload payment provider settings
#[utoipa::path(
    post,
    path = "/api/admin/providers/reload",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Providers reloaded", body = ReloadProvidersResponse),
        (status = 401, description = "Unauthorized")
    )
)]
async fn reload_providers() {}

/// OpenAPI documentation for the salon API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Salon Payment Session API",
        version = "1.0.0",
        description = "QR-code driven client journey for a hair salon: identification, service selection and payment through mobile-money providers.\n\n## Authentication\n\nSession routes are public and rate limited per IP. Admin routes require the admin API key:\n\n```\nAuthorization: Bearer sk_admin_...\n```",
        license(name = "MIT"),
    ),
    paths(
        health,
        start_session,
        direct_auth,
        get_session,
        identify_client,
        select_service,
        initiate_payment,
        abandon,
        summary,
        list_services,
        provider_webhook,
        create_service,
        payment_detail,
        refresh_payment,
        cancel_payment,
        delete_payment,
        expire_sessions,
        reload_providers,
    ),
    components(
        schemas(
            StartSessionRequest,
            SessionResponse,
            HistoryEntryResponse,
            DirectAuthRequest,
            DirectAuthResponse,
            IdentifyClientRequest,
            IdentifyClientResponse,
            SelectServiceRequest,
            InitiatePaymentRequest,
            InitiatePaymentResponse,
            SessionSummary,
            ClientResponse,
            ServiceResponse,
            PaymentResponse,
            PaymentDetailResponse,
            ExternalTransactionResponse,
            WebhookAck,
            ExpireSessionsResponse,
            ReloadProvidersResponse,
            NewClient,
            NewService,
            Gender,
            ServiceCategory,
            PaymentMethod,
            MobileOperator,
            PaymentStatus,
            SessionStatus,
            HistoryAction,
            ClientId,
            ServiceId,
            PaymentId,
        )
    ),

    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Client payment journey"),
        (name = "catalog", description = "Salon services"),
        (name = "webhooks", description = "Payment provider notifications"),
        (name = "admin", description = "Catalog, payment and maintenance operations"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for Bearer token authentication.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
