//! Domain models for the salon payment-session service.

pub mod catalog;
pub mod client;
pub mod correlation;
pub mod external;
pub mod history;
pub mod ids;
pub mod payment;
pub mod session;
pub mod settlement;

pub use catalog::{NewService, Service, ServiceCategory};
pub use client::{Client, Gender, NewClient, normalize_phone};
pub use correlation::PaymentCorrelation;
pub use external::{ExternalTransaction, INITIATED_STATUS};
pub use history::{HistoryAction, SessionHistoryEntry};
pub use ids::{ClientId, ExternalTransactionId, HistoryEntryId, PaymentId, ServiceId, SessionId};
pub use payment::{
    MobileOperator, NewPayment, PaymentMethod, PaymentRecord, PaymentStatus, validate_method,
};
pub use session::{
    NotificationFlags, PaymentSession, RequestMetadata, SESSION_TTL_HOURS, SessionData,
    SessionStatus, SessionToken,
};
pub use settlement::{Settlement, SettlementPolicy};
