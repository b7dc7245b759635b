//! Provider-side transaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ExternalTransactionId, PaymentId};

/// Status stored when the provider accepted an initiation request.
pub const INITIATED_STATUS: &str = "initiated";

/// The provider's view of one payment. At most one per (payment, provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    pub id: ExternalTransactionId,
    pub payment_id: PaymentId,
    pub provider: String,
    pub provider_transaction_id: String,
    pub raw_response: serde_json::Value,
    /// Provider status string, stored verbatim.
    pub provider_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalTransaction {
    pub fn initiated(
        payment_id: PaymentId,
        provider: impl Into<String>,
        provider_transaction_id: impl Into<String>,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExternalTransactionId::new(),
            payment_id,
            provider: provider.into(),
            provider_transaction_id: provider_transaction_id.into(),
            raw_response,
            provider_status: INITIATED_STATUS.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the latest provider payload and status.
    pub fn record_update(
        &mut self,
        provider_status: impl Into<String>,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.provider_status = provider_status.into();
        self.raw_response = raw_response;
        self.updated_at = now;
    }
}
