//! Payment attempt domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ids::{ClientId, PaymentId, ServiceId, SessionId};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
    PrepaidCard,
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::MobileMoney,
        PaymentMethod::Card,
        PaymentMethod::PrepaidCard,
        PaymentMethod::Cash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Card => "card",
            PaymentMethod::PrepaidCard => "prepaid_card",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "Mobile Money",
            PaymentMethod::Card => "Carte bancaire",
            PaymentMethod::PrepaidCard => "Carte prépayée",
            PaymentMethod::Cash => "Espèces",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown payment method: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MobileOperator {
    Wave,
    Orange,
    Mtn,
    Moov,
}

impl MobileOperator {
    pub const ALL: [MobileOperator; 4] = [
        MobileOperator::Wave,
        MobileOperator::Orange,
        MobileOperator::Mtn,
        MobileOperator::Moov,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MobileOperator::Wave => "wave",
            MobileOperator::Orange => "orange",
            MobileOperator::Mtn => "mtn",
            MobileOperator::Moov => "moov",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MobileOperator::Wave => "Wave",
            MobileOperator::Orange => "Orange Money",
            MobileOperator::Mtn => "MTN Mobile Money",
            MobileOperator::Moov => "Moov Money",
        }
    }
}

impl std::fmt::Display for MobileOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MobileOperator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MobileOperator::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown mobile operator: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::InProgress,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
    ];

    pub fn is_final(self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    /// Forward-only transitions; final statuses never change.
    pub fn can_transition_to(self, to: PaymentStatus) -> bool {
        match self {
            PaymentStatus::Pending => to != PaymentStatus::Pending,
            PaymentStatus::InProgress => to.is_final(),
            _ => false,
        }
    }

    /// Maps the callback status vocabulary onto a payment status.
    ///
    /// `completed`, `failed` and `cancelled` are recognised; anything else
    /// means the provider is still working on it.
    pub fn from_callback_status(status: &str) -> PaymentStatus {
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" => PaymentStatus::Succeeded,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::InProgress,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProgress => "in_progress",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown payment status: {s}")))
    }
}

/// Input for a new payment attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub session_id: SessionId,
    pub client_id: ClientId,
    pub service_id: ServiceId,
    pub amount: i64,
    pub method: PaymentMethod,
    pub operator: Option<MobileOperator>,
    pub notes: Option<String>,
}

/// One attempt to pay for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub session_id: SessionId,
    pub client_id: ClientId,
    pub service_id: ServiceId,
    pub amount: i64,
    pub method: PaymentMethod,
    pub operator: Option<MobileOperator>,
    /// Provider-side transaction id, once known.
    pub external_reference: Option<String>,
    /// Internal reference, also sent to providers as their transaction id.
    pub reference_code: String,
    pub status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator must be present for mobile money and absent otherwise.
pub fn validate_method(
    method: PaymentMethod,
    operator: Option<MobileOperator>,
) -> Result<(), DomainError> {
    match (method, operator) {
        (PaymentMethod::MobileMoney, None) => Err(DomainError::Validation(
            "A mobile operator is required for mobile money payments".into(),
        )),
        (PaymentMethod::MobileMoney, Some(_)) | (_, None) => Ok(()),
        (other, Some(op)) => Err(DomainError::Validation(format!(
            "Mobile operator '{op}' is not allowed for {other} payments"
        ))),
    }
}

impl PaymentRecord {
    pub fn new(data: NewPayment, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if data.amount <= 0 {
            return Err(DomainError::Validation(
                "Payment amount must be greater than zero".into(),
            ));
        }
        validate_method(data.method, data.operator)?;

        Ok(Self {
            id: PaymentId::new(),
            session_id: data.session_id,
            client_id: data.client_id,
            service_id: data.service_id,
            amount: data.amount,
            method: data.method,
            operator: data.operator,
            external_reference: None,
            reference_code: generate_reference(now),
            status: PaymentStatus::Pending,
            notes: data.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the payment forward.
    ///
    /// Returns `Ok(false)` when already in `to`, an error on a backwards or
    /// post-final move.
    pub fn advance(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<bool, DomainError> {
        if self.status == to {
            return Ok(false);
        }
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidPaymentTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(true)
    }

    /// e.g. `Mobile Money (Wave)`.
    pub fn method_label(&self) -> String {
        match self.operator {
            Some(op) => format!("{} ({})", self.method.label(), op.label()),
            None => self.method.label().to_string(),
        }
    }
}

fn generate_reference(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "PAY-{}-{}",
        now.format("%Y%m%d"),
        suffix[..10].to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_payment(method: PaymentMethod, operator: Option<MobileOperator>) -> NewPayment {
        NewPayment {
            session_id: SessionId::new(),
            client_id: ClientId::new(),
            service_id: ServiceId::new(),
            amount: 5000,
            method,
            operator,
            notes: None,
        }
    }

    #[test]
    fn test_operator_required_iff_mobile_money() {
        let now = Utc::now();
        assert!(
            PaymentRecord::new(new_payment(PaymentMethod::MobileMoney, None), now).is_err()
        );
        assert!(
            PaymentRecord::new(
                new_payment(PaymentMethod::MobileMoney, Some(MobileOperator::Wave)),
                now
            )
            .is_ok()
        );
        assert!(
            PaymentRecord::new(
                new_payment(PaymentMethod::Cash, Some(MobileOperator::Orange)),
                now
            )
            .is_err()
        );
        assert!(PaymentRecord::new(new_payment(PaymentMethod::Card, None), now).is_ok());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let mut data = new_payment(PaymentMethod::Cash, None);
        data.amount = 0;
        assert!(matches!(
            PaymentRecord::new(data, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_status_is_monotonic() {
        let now = Utc::now();
        let mut p = PaymentRecord::new(new_payment(PaymentMethod::Cash, None), now).unwrap();
        assert!(p.advance(PaymentStatus::InProgress, now).unwrap());
        assert!(!p.advance(PaymentStatus::InProgress, now).unwrap());
        assert!(p.advance(PaymentStatus::Succeeded, now).unwrap());
        assert!(p.advance(PaymentStatus::Failed, now).is_err());
        assert!(p.advance(PaymentStatus::InProgress, now).is_err());
        assert_eq!(p.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn test_pending_can_settle_directly() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::InProgress.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn test_callback_status_mapping() {
        assert_eq!(
            PaymentStatus::from_callback_status("completed"),
            PaymentStatus::Succeeded
        );
        assert_eq!(
            PaymentStatus::from_callback_status("failed"),
            PaymentStatus::Failed
        );
        assert_eq!(
            PaymentStatus::from_callback_status("cancelled"),
            PaymentStatus::Cancelled
        );
        assert_eq!(
            PaymentStatus::from_callback_status("WAITING_FOR_CUSTOMER"),
            PaymentStatus::InProgress
        );
    }

    #[test]
    fn test_reference_and_label() {
        let p = PaymentRecord::new(
            new_payment(PaymentMethod::MobileMoney, Some(MobileOperator::Wave)),
            Utc::now(),
        )
        .unwrap();
        assert!(p.reference_code.starts_with("PAY-"));
        assert_eq!(p.reference_code.len(), "PAY-20260101-".len() + 10);
        assert_eq!(p.method_label(), "Mobile Money (Wave)");
    }
}
