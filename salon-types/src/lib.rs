//! # Salon Types
//!
//! Domain types and port traits for the salon payment-session service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (sessions, clients, services, payments)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain, repository, gateway and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Client, ClientId, ExternalTransaction, Gender, HistoryAction, MobileOperator, NewClient,
    NewService, PaymentCorrelation, PaymentId, PaymentMethod, PaymentRecord, PaymentSession,
    PaymentStatus, RequestMetadata, Service, ServiceCategory, ServiceId, SessionHistoryEntry,
    SessionId, SessionStatus, SessionToken, Settlement, SettlementPolicy,
};
pub use dto::*;
pub use error::{AppError, DomainError, GatewayError, RepoError};
pub use ports::{ChangeSet, PaymentProvider, SalonRepository};
