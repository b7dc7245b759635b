//! Payment provider port.
//!
//! One implementation per aggregator. Implementations translate between the
//! provider's wire protocol and these provider-neutral shapes; they never
//! touch persistence.

use async_trait::async_trait;

use crate::domain::{MobileOperator, PaymentCorrelation, PaymentMethod};
use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: String,
}

/// Everything a provider needs to open a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiationRequest {
    /// Our transaction id as seen by the provider (the payment reference code).
    pub transaction_id: String,
    pub amount: i64,
    pub description: String,
    pub method: PaymentMethod,
    pub operator: Option<MobileOperator>,
    pub customer: CustomerInfo,
    pub correlation: PaymentCorrelation,
}

/// Successful initiation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInitiation {
    pub provider_transaction_id: String,
    pub redirect_url: String,
    pub payment_token: Option<String>,
    pub raw: serde_json::Value,
}

/// Outcome of a status check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatusResult {
    pub provider_transaction_id: String,
    /// Normalized to the callback vocabulary (`completed`, `failed`,
    /// `cancelled`, anything else = still pending).
    pub status: String,
    /// Status string exactly as the provider sent it.
    pub provider_status: String,
    pub correlation: Option<PaymentCorrelation>,
    pub raw: serde_json::Value,
}

/// A parsed inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCallback {
    pub site_id: Option<String>,
    pub provider_transaction_id: String,
    /// Status in the callback vocabulary. Adapters set it only when the
    /// status is authenticated along with the callback; when `None` the
    /// reconciler polls `check_status`.
    pub status: Option<String>,
    pub correlation: Option<PaymentCorrelation>,
    pub signature: Option<String>,
    pub raw_body: Vec<u8>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Stable lower-case provider name, used in routes and storage.
    fn name(&self) -> &'static str;

    /// Opens a checkout with the provider. No retries.
    async fn initiate(&self, request: &InitiationRequest)
    -> Result<ProviderInitiation, GatewayError>;

    async fn check_status(
        &self,
        provider_transaction_id: &str,
    ) -> Result<ProviderStatusResult, GatewayError>;

    /// Parses a raw notification body. `signature` is the provider's
    /// signature header, if any.
    fn parse_callback(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ProviderCallback, GatewayError>;

    /// Checks that a notification really comes from the provider.
    fn verify_callback(&self, callback: &ProviderCallback) -> bool;

    /// Re-reads provider settings. In-flight calls keep the snapshot they
    /// started with.
    fn reload(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
