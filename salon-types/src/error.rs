//! Error types for the salon payment-session service.

use crate::domain::{PaymentStatus, SessionStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Invalid payment transition from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Session inactive: {0}")]
    SessionInactive(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// Unique key clash or a lost optimistic-concurrency race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referential rule that forbids the write (e.g. deleting a referenced row).
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Failures at the payment provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider unreachable: {0}")]
    Network(String),

    #[error("Payment provider did not answer in time")]
    Timeout,

    #[error("Payment provider returned HTTP {status}")]
    HttpStatus { status: u16, body: String },

    #[error("Payment provider refused the request ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),

    #[error("Payment provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("Unknown payment provider '{0}'")]
    UnknownProvider(String),
}

impl GatewayError {
    /// True when the failure came from the transport or the provider's
    /// infrastructure rather than a business refusal.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Timeout
                | GatewayError::HttpStatus { .. }
                | GatewayError::InvalidResponse(_)
        )
    }

    /// Message safe to show to the client.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout => {
                "The payment service is unreachable, please try again in a moment".into()
            }
            GatewayError::HttpStatus { status, .. } => {
                format!("The payment service answered with an error (HTTP {status})")
            }
            GatewayError::Provider { message, .. } => {
                format!("Payment refused by the provider: {message}")
            }
            GatewayError::InvalidResponse(_) => {
                "The payment service returned an unexpected response".into()
            }
            GatewayError::NotConfigured(name) | GatewayError::UnknownProvider(name) => {
                format!("Payment provider '{name}' is not available")
            }
        }
    }
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session inactive: {0}")]
    SessionInactive(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{}", .0.user_message())]
    Gateway(GatewayError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NotFound(msg) => AppError::NotFound(msg),
            DomainError::InvalidTransition { from, to } => AppError::InvalidTransition { from, to },
            DomainError::InvalidPaymentTransition { from, to } => AppError::Validation(format!(
                "Payment cannot move from {from} to {to}"
            )),
            DomainError::SessionInactive(msg) => AppError::SessionInactive(msg),
            DomainError::Constraint(msg) => AppError::Constraint(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Constraint(e) => AppError::Constraint(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}
