//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod provider;
mod repository;

pub use provider::{
    CustomerInfo, InitiationRequest, PaymentProvider, ProviderCallback, ProviderInitiation,
    ProviderStatusResult,
};
pub use repository::{ChangeSet, ExternalWrite, PaymentUpdate, SalonRepository};
