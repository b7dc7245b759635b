//! Localized end-of-journey messages.

use serde::Deserialize;

use salon_types::{Client, DomainError, Service, SessionStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Fr,
    En,
}

impl std::str::FromStr for Locale {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fr" | "fr-fr" | "fr-ci" => Ok(Locale::Fr),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(DomainError::Validation(format!("Unsupported language: {other}"))),
        }
    }
}

/// Thank-you text: personalized when the client is known, mentions the
/// service category, and confirms the payment once it succeeded.
pub fn thank_you_message(
    locale: Locale,
    client: Option<&Client>,
    service: Option<&Service>,
    status: SessionStatus,
) -> String {
    let mut message = match (locale, client) {
        (Locale::Fr, Some(c)) => format!("Merci {} !", c.first_name),
        (Locale::Fr, None) => "Merci pour votre visite !".to_string(),
        (Locale::En, Some(c)) => format!("Thank you {}!", c.first_name),
        (Locale::En, None) => "Thank you for your visit!".to_string(),
    };

    if let Some(service) = service {
        let category = service.category.label().to_lowercase();
        match locale {
            Locale::Fr => {
                message.push_str(&format!(" Votre {category} a été enregistré avec succès."))
            }
            Locale::En => {
                message.push_str(&format!(" Your {category} has been recorded successfully."))
            }
        }
    }

    if status == SessionStatus::PaymentSucceeded {
        message.push_str(match locale {
            Locale::Fr => " Votre paiement a été confirmé. À bientôt dans notre salon !",
            Locale::En => " Your payment has been confirmed. See you soon at our salon!",
        });
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use salon_types::{NewClient, NewService, ServiceCategory};

    fn awa() -> Client {
        Client::new(
            "+2250700000000",
            NewClient {
                last_name: "Koné".into(),
                first_name: "Awa".into(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn shampoo() -> Service {
        Service::new(
            NewService {
                name: "Shampoing doux".into(),
                category: ServiceCategory::Shampoo,
                description: None,
                price_min: 2000,
                price_max: None,
                estimated_minutes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_anonymous_message() {
        let msg = thank_you_message(Locale::Fr, None, None, SessionStatus::Scanned);
        assert_eq!(msg, "Merci pour votre visite !");
    }

    #[test]
    fn test_full_french_message() {
        let msg = thank_you_message(
            Locale::Fr,
            Some(&awa()),
            Some(&shampoo()),
            SessionStatus::PaymentSucceeded,
        );
        assert_eq!(
            msg,
            "Merci Awa ! Votre shampoing a été enregistré avec succès. \
             Votre paiement a été confirmé. À bientôt dans notre salon !"
        );
    }

    #[test]
    fn test_english_without_confirmation() {
        let msg = thank_you_message(
            Locale::En,
            Some(&awa()),
            Some(&shampoo()),
            SessionStatus::PaymentInitiated,
        );
        assert_eq!(msg, "Thank you Awa! Your shampoing has been recorded successfully.");
    }

    #[test]
    fn test_locale_parsing() {
        assert_eq!("EN".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("fr-CI".parse::<Locale>().unwrap(), Locale::Fr);
        assert!("de".parse::<Locale>().is_err());
    }
}
