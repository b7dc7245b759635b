//! Service catalog (prestations) and price bands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::ServiceId;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    DreadlocksNew,
    SisterLocks,
    NidsLocks,
    Shampoo,
    Retightening,
    Styling,
    Other,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 7] = [
        ServiceCategory::DreadlocksNew,
        ServiceCategory::SisterLocks,
        ServiceCategory::NidsLocks,
        ServiceCategory::Shampoo,
        ServiceCategory::Retightening,
        ServiceCategory::Styling,
        ServiceCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::DreadlocksNew => "dreadlocks_new",
            ServiceCategory::SisterLocks => "sister_locks",
            ServiceCategory::NidsLocks => "nids_locks",
            ServiceCategory::Shampoo => "shampoo",
            ServiceCategory::Retightening => "retightening",
            ServiceCategory::Styling => "styling",
            ServiceCategory::Other => "other",
        }
    }

    /// Label shown to clients.
    pub fn label(self) -> &'static str {
        match self {
            ServiceCategory::DreadlocksNew => "Dreadlocks (nouveau)",
            ServiceCategory::SisterLocks => "Sister locks",
            ServiceCategory::NidsLocks => "Nids locks",
            ServiceCategory::Shampoo => "Shampoing",
            ServiceCategory::Retightening => "Resserrage",
            ServiceCategory::Styling => "Coiffure",
            ServiceCategory::Other => "Autre",
        }
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown service category: {s}")))
    }
}

/// A service offered by the salon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
    /// Lower bound of the price band, in whole currency units.
    pub price_min: i64,
    /// Upper bound; `None` means the price is fixed at `price_min`.
    pub price_max: Option<i64>,
    pub estimated_minutes: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for registering a new catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewService {
    #[schema(example = "Sister locks complet")]
    pub name: String,
    pub category: ServiceCategory,
    #[serde(default)]
    pub description: Option<String>,
    #[schema(example = 5000)]
    pub price_min: i64,
    #[serde(default)]
    pub price_max: Option<i64>,
    #[serde(default)]
    pub estimated_minutes: Option<i32>,
}

impl Service {
    pub fn new(data: NewService, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let name = data.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::Validation("Service name cannot be empty".into()));
        }
        if data.price_min <= 0 {
            return Err(DomainError::Validation(
                "Minimum price must be greater than zero".into(),
            ));
        }
        if let Some(max) = data.price_max {
            if max < data.price_min {
                return Err(DomainError::Validation(format!(
                    "Maximum price {max} is below minimum price {}",
                    data.price_min
                )));
            }
        }
        if matches!(data.estimated_minutes, Some(m) if m <= 0) {
            return Err(DomainError::Validation(
                "Estimated duration must be positive".into(),
            ));
        }

        Ok(Self {
            id: ServiceId::new(),
            name,
            category: data.category,
            description: data.description,
            price_min: data.price_min,
            price_max: data.price_max,
            estimated_minutes: data.estimated_minutes,
            active: true,
            created_at: now,
        })
    }

    /// Inclusive `[min, max]` band; a missing max collapses it to the min.
    pub fn price_band(&self) -> (i64, i64) {
        (self.price_min, self.price_max.unwrap_or(self.price_min))
    }

    /// Picks the amount to charge: the requested one if inside the band,
    /// the minimum when nothing was requested.
    pub fn resolve_amount(&self, requested: Option<i64>) -> Result<i64, DomainError> {
        let (min, max) = self.price_band();
        let Some(amount) = requested else {
            return Ok(min);
        };
        if amount < min || amount > max {
            return Err(DomainError::Validation(format!(
                "Amount {amount} is outside the price range of '{}' ({})",
                self.name,
                self.display_price()
            )));
        }
        Ok(amount)
    }

    /// Human readable price, e.g. `5 000 à 10 000 FCFA`.
    pub fn display_price(&self) -> String {
        match self.price_max {
            Some(max) if max != self.price_min => format!(
                "{} à {} FCFA",
                group_thousands(self.price_min),
                group_thousands(max)
            ),
            _ => format!("{} FCFA", group_thousands(self.price_min)),
        }
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    if value < 0 { format!("-{out}") } else { out }
}
