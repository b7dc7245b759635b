//! Provider registry and settlement routing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use salon_types::ports::{CustomerInfo, InitiationRequest, ProviderInitiation};
use salon_types::{
    Client, GatewayError, PaymentCorrelation, PaymentMethod, PaymentProvider, PaymentRecord,
    PaymentSession, Service, Settlement, SettlementPolicy,
};

/// The payment providers the service can talk to, plus the policy that
/// decides which one (if any) settles each payment method.
pub struct PaymentGateway {
    providers: HashMap<&'static str, Arc<dyn PaymentProvider>>,
    policy: SettlementPolicy,
}

impl PaymentGateway {
    pub fn new(policy: SettlementPolicy) -> Self {
        Self {
            providers: HashMap::new(),
            policy,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    pub fn route(&self, method: PaymentMethod) -> Settlement {
        self.policy.route(method)
    }

    pub fn provider(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, GatewayError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownProvider(name.to_string()))
    }

    /// Opens a checkout for `payment` with the named provider.
    pub async fn initiate(
        &self,
        provider: &str,
        payment: &PaymentRecord,
        session: &PaymentSession,
        client: &Client,
        service: &Service,
    ) -> Result<ProviderInitiation, GatewayError> {
        let provider = self.provider(provider)?;
        let request = InitiationRequest {
            transaction_id: payment.reference_code.clone(),
            amount: payment.amount,
            description: format!("{} - {}", service.name, client.full_name()),
            method: payment.method,
            operator: payment.operator,
            customer: CustomerInfo {
                id: client.id.to_string(),
                first_name: client.first_name.clone(),
                last_name: client.last_name.clone(),
                email: client.email.clone(),
                phone: client.phone.clone(),
            },
            correlation: PaymentCorrelation {
                session_id: session.token.clone(),
                payment_id: payment.id,
                method: payment.method,
            },
        };
        provider.initiate(&request).await
    }

    /// Reloads every provider's settings. Returns the names that reloaded;
    /// a failing provider keeps its previous settings.
    pub fn reload_all(&self) -> Vec<String> {
        let mut reloaded = Vec::new();
        for (name, provider) in &self.providers {
            match provider.reload() {
                Ok(()) => reloaded.push(name.to_string()),
                Err(e) => warn!(provider = %name, error = %e, "Provider reload failed"),
            }
        }
        reloaded.sort();
        info!(count = reloaded.len(), "Provider settings reloaded");
        reloaded
    }
}
