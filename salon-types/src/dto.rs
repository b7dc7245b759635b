//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Client, ClientId, ExternalTransaction, Gender, HistoryAction, MobileOperator, NewClient,
    PaymentId, PaymentMethod, PaymentRecord, PaymentSession, PaymentStatus, Service,
    ServiceCategory, ServiceId, SessionData, SessionHistoryEntry, SessionStatus, SessionToken,
};

// ─────────────────────────────────────────────────────────────────────────────
// Session DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open a session after a QR scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// Optional client-chosen session token (8-64 chars of `[A-Za-z0-9_-]`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "qr-table-04-2f9c")]
    pub session_id: Option<String>,
    /// Optional device label (kiosk, tablet, phone)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Public session token
    #[schema(value_type = String, example = "qr-table-04-2f9c")]
    pub session_id: SessionToken,
    pub status: SessionStatus,
    /// Workflow step, 1 (scan) to 5 (finished elsewhere)
    #[schema(example = 3)]
    pub step: u8,
    pub is_active: bool,
    pub client_id: Option<ClientId>,
    pub service_id: Option<ServiceId>,
    /// Agreed amount in FCFA
    pub amount: Option<i64>,
    pub payment_id: Option<PaymentId>,
    #[schema(value_type = Object)]
    pub data: SessionData,
    pub scanned_at: DateTime<Utc>,
    pub identified_at: Option<DateTime<Utc>>,
    pub service_selected_at: Option<DateTime<Utc>>,
    pub payment_initiated_at: Option<DateTime<Utc>>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Audit trail, included on detail reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntryResponse>,
}

impl SessionResponse {
    pub fn from_session(session: &PaymentSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session.token.clone(),
            status: session.status,
            step: session.step(),
            is_active: session.is_active(now),
            client_id: session.client_id,
            service_id: session.service_id,
            amount: session.amount,
            payment_id: session.data.payment_id,
            data: session.data.clone(),
            scanned_at: session.scanned_at,
            identified_at: session.identified_at,
            service_selected_at: session.service_selected_at,
            payment_initiated_at: session.payment_initiated_at,
            payment_completed_at: session.payment_completed_at,
            expires_at: session.effective_expiry(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: &[SessionHistoryEntry]) -> Self {
        self.history = history.iter().map(HistoryEntryResponse::from).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub action: HistoryAction,
    pub description: String,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionHistoryEntry> for HistoryEntryResponse {
    fn from(entry: &SessionHistoryEntry) -> Self {
        Self {
            action: entry.action,
            description: entry.description.clone(),
            payload: entry.payload.clone(),
            ip_address: entry.ip_address.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Identify the client by phone, registering them if unknown.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentifyClientRequest {
    #[schema(example = "+2250700000000")]
    pub phone: String,
    /// Required only when the phone number is not registered yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<NewClient>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentifyClientResponse {
    pub session: SessionResponse,
    pub client: ClientResponse,
    /// True when the client was registered by this call
    pub created: bool,
}

/// Start a session and identify the client in one call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DirectAuthRequest {
    #[schema(example = "+2250700000000")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<NewClient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DirectAuthResponse {
    pub session: SessionResponse,
    pub client: ClientResponse,
    pub created: bool,
    /// Where the front end continues the journey
    #[schema(example = "/session/qr-table-04-2f9c")]
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SelectServiceRequest {
    pub service_id: ServiceId,
    /// Amount in FCFA; defaults to the service's minimum price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 5000)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub method: PaymentMethod,
    /// Required for mobile money, forbidden otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<MobileOperator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub session_status: SessionStatus,
    /// Provider checkout page, for provider-settled methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    #[schema(value_type = String)]
    pub session_id: SessionToken,
    pub status: SessionStatus,
    pub step: u8,
    pub amount: Option<i64>,
    pub client: Option<ClientResponse>,
    pub service: Option<ServiceResponse>,
    pub payment: Option<PaymentResponse>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Localized thank-you message
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client & catalog DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub gender: Option<Gender>,
    pub phone: String,
    pub email: Option<String>,
    pub neighborhood: Option<String>,
}

impl From<&Client> for ClientResponse {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            first_name: client.first_name.clone(),
            last_name: client.last_name.clone(),
            full_name: client.full_name(),
            gender: client.gender,
            phone: client.phone.clone(),
            email: client.email.clone(),
            neighborhood: client.neighborhood.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceResponse {
    pub id: ServiceId,
    pub name: String,
    pub category: ServiceCategory,
    #[schema(example = "Sister locks")]
    pub category_label: String,
    pub description: Option<String>,
    pub price_min: i64,
    pub price_max: Option<i64>,
    #[schema(example = "5 000 à 10 000 FCFA")]
    pub display_price: String,
    pub estimated_minutes: Option<i32>,
    pub active: bool,
}

impl From<&Service> for ServiceResponse {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            category: service.category,
            category_label: service.category.label().to_string(),
            description: service.description.clone(),
            price_min: service.price_min,
            price_max: service.price_max,
            display_price: service.display_price(),
            estimated_minutes: service.estimated_minutes,
            active: service.active,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub amount: i64,
    pub method: PaymentMethod,
    pub operator: Option<MobileOperator>,
    #[schema(example = "Mobile Money (Wave)")]
    pub method_label: String,
    pub status: PaymentStatus,
    pub reference_code: String,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentRecord> for PaymentResponse {
    fn from(payment: &PaymentRecord) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            method: payment.method,
            operator: payment.operator,
            method_label: payment.method_label(),
            status: payment.status,
            reference_code: payment.reference_code.clone(),
            external_reference: payment.external_reference.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExternalTransactionResponse {
    pub provider: String,
    pub provider_transaction_id: String,
    pub provider_status: String,
    #[schema(value_type = Object)]
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExternalTransaction> for ExternalTransactionResponse {
    fn from(tx: &ExternalTransaction) -> Self {
        Self {
            provider: tx.provider.clone(),
            provider_transaction_id: tx.provider_transaction_id.clone(),
            provider_status: tx.provider_status.clone(),
            raw_response: tx.raw_response.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Admin view of a payment and its provider records.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentDetailResponse {
    pub payment: PaymentResponse,
    #[schema(value_type = String)]
    pub session_id: SessionToken,
    pub external_transactions: Vec<ExternalTransactionResponse>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook & maintenance DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Body returned to providers for every accepted delivery.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpireSessionsResponse {
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReloadProvidersResponse {
    pub reloaded: Vec<String>,
}
