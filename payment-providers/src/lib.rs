//! # Payment Providers
//!
//! Outbound adapters for the payment aggregators the salon works with.
//! Each adapter implements [`salon_types::PaymentProvider`]:
//!
//! - [`CinetPayProvider`] - CinetPay checkout v2 (mobile money and cards)
//! - [`PayDunyaProvider`] - placeholder that reports itself as not configured
//!
//! Provider settings live behind a [`SettingsHandle`] so they can be reloaded
//! at runtime without disturbing calls already in flight.

pub mod cinetpay;
pub mod paydunya;
pub mod settings;
pub mod signature;

#[cfg(test)]
mod cinetpay_tests;

pub use cinetpay::{CinetPayMode, CinetPayProvider, CinetPaySettings};
pub use paydunya::PayDunyaProvider;
pub use settings::SettingsHandle;
