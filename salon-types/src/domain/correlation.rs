//! Metadata echoed back by providers so callbacks can be tied to a payment.

use serde::{Deserialize, Serialize};

use super::ids::PaymentId;
use super::payment::PaymentMethod;
use super::session::SessionToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCorrelation {
    pub session_id: SessionToken,
    pub payment_id: PaymentId,
    pub method: PaymentMethod,
}

impl PaymentCorrelation {
    /// Encodes as a JSON string, the form providers accept as free metadata.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes metadata that came back either as a JSON string or as an
    /// already-parsed object. Unknown shapes yield `None`.
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(raw) => serde_json::from_str(raw).ok(),
            serde_json::Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}
