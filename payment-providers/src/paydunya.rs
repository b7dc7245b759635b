//! PayDunya adapter placeholder.
//!
//! Routes exist so a settlement policy can name it, but every call answers
//! [`GatewayError::NotConfigured`] and every notification is rejected.

use async_trait::async_trait;

use salon_types::GatewayError;
use salon_types::ports::{
    InitiationRequest, PaymentProvider, ProviderCallback, ProviderInitiation,
    ProviderStatusResult,
};

pub const PROVIDER_NAME: &str = "paydunya";

#[derive(Debug, Default, Clone, Copy)]
pub struct PayDunyaProvider;

impl PayDunyaProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentProvider for PayDunyaProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn initiate(
        &self,
        _request: &InitiationRequest,
    ) -> Result<ProviderInitiation, GatewayError> {
        Err(GatewayError::NotConfigured(PROVIDER_NAME.into()))
    }

    async fn check_status(
        &self,
        _provider_transaction_id: &str,
    ) -> Result<ProviderStatusResult, GatewayError> {
        Err(GatewayError::NotConfigured(PROVIDER_NAME.into()))
    }

    fn parse_callback(
        &self,
        _body: &[u8],
        _signature: Option<&str>,
    ) -> Result<ProviderCallback, GatewayError> {
        Err(GatewayError::NotConfigured(PROVIDER_NAME.into()))
    }

    fn verify_callback(&self, _callback: &ProviderCallback) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_is_not_configured() {
        let provider = PayDunyaProvider::new();
        assert_eq!(provider.name(), "paydunya");
        assert_eq!(
            provider.check_status("tx").await.unwrap_err(),
            GatewayError::NotConfigured("paydunya".into())
        );
        assert!(provider.parse_callback(b"{}", None).is_err());
    }
}
