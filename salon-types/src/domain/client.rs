//! Salon client domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::ClientId;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(DomainError::Validation(format!("Unknown gender: {other}"))),
        }
    }
}

/// A salon client, identified by a unique phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub last_name: String,
    pub first_name: String,
    pub gender: Option<Gender>,
    pub phone: String,
    pub email: Option<String>,
    pub neighborhood: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a phone number is not known yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewClient {
    #[schema(example = "Koné")]
    pub last_name: String,
    #[schema(example = "Awa")]
    pub first_name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
}

/// Normalizes and validates a phone number.
///
/// Accepts an optional leading `+` followed by 9 to 15 digits (16 when the
/// number carries a leading `1` country prefix).
pub fn normalize_phone(raw: &str) -> Result<String, DomainError> {
    let phone = raw.trim();
    if phone.is_empty() {
        return Err(DomainError::Validation("Phone number is required".into()));
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let all_digits = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    let len = digits.len();
    let len_ok = (9..=15).contains(&len) || (digits.starts_with('1') && len == 16);
    if !all_digits || !len_ok {
        return Err(DomainError::Validation(format!(
            "Invalid phone number '{phone}': expected up to 15 digits, optionally prefixed with '+'"
        )));
    }
    Ok(phone.to_string())
}

impl Client {
    /// Creates a client after validating every field.
    pub fn new(phone: &str, data: NewClient, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let phone = normalize_phone(phone)?;
        let last_name = data.last_name.trim().to_string();
        let first_name = data.first_name.trim().to_string();
        if last_name.is_empty() || first_name.is_empty() {
            return Err(DomainError::Validation(
                "First and last name are required to register a new client".into(),
            ));
        }
        let email = data
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
                return Err(DomainError::Validation(format!("Invalid email: {email}")));
            }
        }

        Ok(Self {
            id: ClientId::new(),
            last_name,
            first_name,
            gender: data.gender,
            phone,
            email,
            neighborhood: data.neighborhood.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awa() -> NewClient {
        NewClient {
            last_name: "Koné".into(),
            first_name: "Awa".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_phone_formats() {
        assert!(normalize_phone("+2250700000000").is_ok());
        assert!(normalize_phone("0700000000").is_ok());
        assert!(normalize_phone(" 0700000000 ").is_ok());
        assert!(normalize_phone("12345678").is_err());
        assert!(normalize_phone("07-00-00-00-00").is_err());
        assert!(normalize_phone("").is_err());
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new("+2250700000000", awa(), Utc::now()).unwrap();
        assert_eq!(client.full_name(), "Awa Koné");
        assert_eq!(client.phone, "+2250700000000");
    }

    #[test]
    fn test_missing_names_fail() {
        let result = Client::new("+2250700000000", NewClient::default(), Utc::now());
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_bad_email_fails() {
        let data = NewClient {
            email: Some("awa.example.com".into()),
            ..awa()
        };
        assert!(Client::new("+2250700000000", data, Utc::now()).is_err());
    }
}
