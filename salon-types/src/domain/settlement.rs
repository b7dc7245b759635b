//! Per-method settlement routing.

use std::collections::HashMap;

use super::payment::PaymentMethod;
use crate::error::DomainError;

/// How a payment method is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Confirmed on the spot (cash at the counter, card terminal).
    Immediate,
    /// Routed through the named payment provider.
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPolicy {
    routes: HashMap<PaymentMethod, Settlement>,
}

impl Default for SettlementPolicy {
    /// Mobile money through CinetPay, everything else settled immediately.
    fn default() -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            PaymentMethod::MobileMoney,
            Settlement::Provider("cinetpay".into()),
        );
        Self { routes }
    }
}

impl SettlementPolicy {
    pub fn route(&self, method: PaymentMethod) -> Settlement {
        self.routes
            .get(&method)
            .cloned()
            .unwrap_or(Settlement::Immediate)
    }

    pub fn with_route(mut self, method: PaymentMethod, settlement: Settlement) -> Self {
        self.routes.insert(method, settlement);
        self
    }

    /// Parses `method=target` pairs separated by commas, applied over the
    /// defaults. `immediate` is the reserved target for on-the-spot settlement.
    ///
    /// Example: `mobile_money=cinetpay,card=cinetpay`.
    pub fn parse(routes: &str) -> Result<Self, DomainError> {
        let mut policy = Self::default();
        for pair in routes.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (method, target) = pair.split_once('=').ok_or_else(|| {
                DomainError::Validation(format!("Invalid settlement route '{pair}'"))
            })?;
            let method: PaymentMethod = method.trim().parse()?;
            let target = target.trim().to_ascii_lowercase();
            let settlement = match target.as_str() {
                "" => {
                    return Err(DomainError::Validation(format!(
                        "Missing settlement target for {method}"
                    )));
                }
                "immediate" => Settlement::Immediate,
                provider => Settlement::Provider(provider.to_string()),
            };
            policy.routes.insert(method, settlement);
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        let policy = SettlementPolicy::default();
        assert_eq!(
            policy.route(PaymentMethod::MobileMoney),
            Settlement::Provider("cinetpay".into())
        );
        assert_eq!(policy.route(PaymentMethod::Cash), Settlement::Immediate);
        assert_eq!(policy.route(PaymentMethod::Card), Settlement::Immediate);
    }

    #[test]
    fn test_parse_overrides_defaults() {
        let policy = SettlementPolicy::parse("card=CinetPay, mobile_money=immediate").unwrap();
        assert_eq!(
            policy.route(PaymentMethod::Card),
            Settlement::Provider("cinetpay".into())
        );
        assert_eq!(
            policy.route(PaymentMethod::MobileMoney),
            Settlement::Immediate
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(SettlementPolicy::parse("card").is_err());
        assert!(SettlementPolicy::parse("bitcoin=cinetpay").is_err());
        assert!(SettlementPolicy::parse("card=").is_err());
    }
}
