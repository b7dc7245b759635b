//! Append-only session audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{HistoryEntryId, SessionId};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Scan,
    DirectAuth,
    ClientLookup,
    ClientCreate,
    ServiceSelection,
    PaymentInitiation,
    PaymentConfirmation,
    PaymentFailure,
    NotificationSent,
    Abandonment,
    Expiration,
}

impl HistoryAction {
    pub const ALL: [HistoryAction; 11] = [
        HistoryAction::Scan,
        HistoryAction::DirectAuth,
        HistoryAction::ClientLookup,
        HistoryAction::ClientCreate,
        HistoryAction::ServiceSelection,
        HistoryAction::PaymentInitiation,
        HistoryAction::PaymentConfirmation,
        HistoryAction::PaymentFailure,
        HistoryAction::NotificationSent,
        HistoryAction::Abandonment,
        HistoryAction::Expiration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Scan => "scan",
            HistoryAction::DirectAuth => "direct_auth",
            HistoryAction::ClientLookup => "client_lookup",
            HistoryAction::ClientCreate => "client_create",
            HistoryAction::ServiceSelection => "service_selection",
            HistoryAction::PaymentInitiation => "payment_initiation",
            HistoryAction::PaymentConfirmation => "payment_confirmation",
            HistoryAction::PaymentFailure => "payment_failure",
            HistoryAction::NotificationSent => "notification_sent",
            HistoryAction::Abandonment => "abandonment",
            HistoryAction::Expiration => "expiration",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HistoryAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HistoryAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown history action: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub id: HistoryEntryId,
    pub session_id: SessionId,
    pub action: HistoryAction,
    pub description: String,
    pub payload: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionHistoryEntry {
    pub fn new(
        session_id: SessionId,
        action: HistoryAction,
        description: impl Into<String>,
        payload: serde_json::Value,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            session_id,
            action,
            description: description.into(),
            payload,
            ip_address,
            created_at: now,
        }
    }
}
