//! # Salon Hex
//!
//! Application service layer and HTTP adapter for the salon payment-session
//! service.
//!
//! ## Architecture
//!
//! - `service` - Session state machine orchestration
//! - `reconciler` - Provider notifications, status refresh, cancellation
//! - `gateway` - Provider registry and per-method settlement routing
//! - `expiry` - Background sweep expiring stale sessions
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `R: SalonRepository`, allowing different
//! repository implementations to be injected.

pub mod expiry;
pub mod gateway;
pub mod inbound;
pub mod locks;
mod openapi;
pub mod reconciler;
pub mod service;
pub mod summary;


pub use expiry::ExpiryWorker;
pub use gateway::PaymentGateway;
pub use reconciler::{CallbackOutcome, Reconciliation, StatusReport};
pub use service::{
    ClientIdentification, PaymentDetail, PaymentInitiation, RequestContext, SessionDetail,
    SessionService,
};
pub use summary::Locale;
