//! Payment session domain model and its state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ids::{ClientId, PaymentId, ServiceId, SessionId};
use crate::error::DomainError;

/// Sessions without an explicit expiry lapse this long after creation.
pub const SESSION_TTL_HOURS: i64 = 24;

const TOKEN_MIN_LEN: usize = 8;
const TOKEN_MAX_LEN: usize = 64;

/// Public, opaque session token carried in URLs and QR codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validates a client-supplied token.
    ///
    /// Accepts 8 to 64 characters from `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let valid_len = (TOKEN_MIN_LEN..=TOKEN_MAX_LEN).contains(&raw.len());
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_len || !valid_chars {
            return Err(DomainError::Validation(format!(
                "Invalid session token: expected {TOKEN_MIN_LEN}-{TOKEN_MAX_LEN} characters of [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session stands in the client journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scanned,
    Identification,
    ServiceSelected,
    PaymentInitiated,
    PaymentSucceeded,
    PaymentFailed,
    Abandoned,
    Expired,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 8] = [
        SessionStatus::Scanned,
        SessionStatus::Identification,
        SessionStatus::ServiceSelected,
        SessionStatus::PaymentInitiated,
        SessionStatus::PaymentSucceeded,
        SessionStatus::PaymentFailed,
        SessionStatus::Abandoned,
        SessionStatus::Expired,
    ];

    /// Statuses reachable through a user or provider driven transition.
    ///
    /// `Expired` is not listed: it is a system transition allowed from every
    /// non-terminal status (see [`SessionStatus::can_transition_to`]).
    pub fn allowed_targets(self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Scanned => &[Identification],
            Identification => &[ServiceSelected, Abandoned],
            ServiceSelected => &[PaymentInitiated, Abandoned],
            PaymentInitiated => &[PaymentSucceeded, PaymentFailed],
            PaymentFailed => &[Abandoned],
            PaymentSucceeded | Abandoned | Expired => &[],
        }
    }

    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        if to == SessionStatus::Expired {
            return !self.is_terminal();
        }
        self.allowed_targets().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::PaymentSucceeded | SessionStatus::Abandoned | SessionStatus::Expired
        )
    }

    /// Workflow step shown to the client (1 to 5).
    pub fn step(self) -> u8 {
        use SessionStatus::*;
        match self {
            Scanned => 1,
            Identification => 2,
            ServiceSelected => 3,
            PaymentInitiated | PaymentSucceeded | PaymentFailed => 4,
            Abandoned | Expired => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        use SessionStatus::*;
        match self {
            Scanned => "scanned",
            Identification => "identification",
            ServiceSelected => "service_selected",
            PaymentInitiated => "payment_initiated",
            PaymentSucceeded => "payment_succeeded",
            PaymentFailed => "payment_failed",
            Abandoned => "abandoned",
            Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("Unknown session status: {s}")))
    }
}

/// Information captured from the HTTP request that opened the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationFlags {
    pub email_sent: bool,
    pub sms_sent: bool,
}

/// Session-scoped key/value data.
///
/// The in-flight payment id has a typed slot; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One client journey from QR scan to payment outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: SessionId,
    pub token: SessionToken,
    pub client_id: Option<ClientId>,
    pub service_id: Option<ServiceId>,
    /// Agreed amount in whole currency units, set at service selection.
    pub amount: Option<i64>,
    pub status: SessionStatus,
    pub scanned_at: DateTime<Utc>,
    pub identified_at: Option<DateTime<Utc>>,
    pub service_selected_at: Option<DateTime<Utc>>,
    pub payment_initiated_at: Option<DateTime<Utc>>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub data: SessionData,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: RequestMetadata,
    pub notifications: NotificationFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every persisted update.
    pub version: i64,
}

impl PaymentSession {
    /// Opens a session in `Scanned` with the default 24h expiry.
    pub fn start(
        token: Option<SessionToken>,
        metadata: RequestMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            token: token.unwrap_or_else(SessionToken::generate),
            client_id: None,
            service_id: None,
            amount: None,
            status: SessionStatus::Scanned,
            scanned_at: now,
            identified_at: None,
            service_selected_at: None,
            payment_initiated_at: None,
            payment_completed_at: None,
            data: SessionData::default(),
            expires_at: Some(now + Duration::hours(SESSION_TTL_HOURS)),
            metadata,
            notifications: NotificationFlags::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Expiry instant: the stored timestamp, else creation + 24h.
    pub fn effective_expiry(&self) -> DateTime<Utc> {
        self.expires_at
            .unwrap_or(self.created_at + Duration::hours(SESSION_TTL_HOURS))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.effective_expiry()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.status.is_terminal()
    }

    /// Rejects user mutations on expired or finished sessions.
    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::SessionInactive(format!(
                "Session {} is {}",
                self.token, self.status
            )));
        }
        if self.is_expired(now) {
            return Err(DomainError::SessionInactive(format!(
                "Session {} has expired",
                self.token
            )));
        }
        Ok(())
    }

    pub fn step(&self) -> u8 {
        self.status.step()
    }

    /// Moves to `to`, stamping the matching stage timestamp.
    ///
    /// Nothing is mutated when the transition is illegal.
    pub fn transition(&mut self, to: SessionStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        match to {
            SessionStatus::Identification => self.identified_at = Some(now),
            SessionStatus::ServiceSelected => self.service_selected_at = Some(now),
            SessionStatus::PaymentInitiated => self.payment_initiated_at = Some(now),
            SessionStatus::PaymentSucceeded | SessionStatus::PaymentFailed => {
                self.payment_completed_at = Some(now)
            }
            _ => {}
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn identify(&mut self, client_id: ClientId, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(SessionStatus::Identification, now)?;
        self.client_id = Some(client_id);
        Ok(())
    }

    /// Records the chosen service and agreed amount.
    pub fn select_service(
        &mut self,
        service_id: ServiceId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.client_id.is_none() {
            return Err(DomainError::NotFound(format!(
                "Session {} has no identified client",
                self.token
            )));
        }
        self.transition(SessionStatus::ServiceSelected, now)?;
        self.service_id = Some(service_id);
        self.amount = Some(amount);
        Ok(())
    }

    pub fn mark_payment_initiated(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition(SessionStatus::PaymentInitiated, now)?;
        self.data.payment_id = Some(payment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PaymentSession {
        PaymentSession::start(None, RequestMetadata::default(), Utc::now())
    }

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        let legal = [
            (Scanned, Identification),
            (Identification, ServiceSelected),
            (Identification, Abandoned),
            (ServiceSelected, PaymentInitiated),
            (ServiceSelected, Abandoned),
            (PaymentInitiated, PaymentSucceeded),
            (PaymentInitiated, PaymentFailed),
            (PaymentFailed, Abandoned),
        ];
        for from in SessionStatus::ALL {
            for to in SessionStatus::ALL {
                let expected = legal.contains(&(from, to)) || (to == Expired && !from.is_terminal());
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn test_illegal_transition_leaves_session_untouched() {
        let mut s = session();
        let before = s.clone();
        let err = s
            .transition(SessionStatus::PaymentSucceeded, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: SessionStatus::Scanned,
                to: SessionStatus::PaymentSucceeded
            }
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn test_start_sets_default_expiry() {
        let now = Utc::now();
        let s = PaymentSession::start(None, RequestMetadata::default(), now);
        assert_eq!(s.status, SessionStatus::Scanned);
        assert_eq!(s.expires_at, Some(now + Duration::hours(24)));
        assert!(s.is_active(now));
        assert!(!s.is_active(now + Duration::hours(24)));
    }

    #[test]
    fn test_expiry_falls_back_to_creation_time() {
        let now = Utc::now();
        let mut s = PaymentSession::start(None, RequestMetadata::default(), now);
        s.expires_at = None;
        assert!(s.is_active(now + Duration::hours(23)));
        assert!(s.is_expired(now + Duration::hours(25)));
    }

    #[test]
    fn test_terminal_session_is_inactive() {
        let now = Utc::now();
        let mut s = session();
        s.transition(SessionStatus::Expired, now).unwrap();
        assert!(!s.is_active(now));
        assert!(matches!(
            s.ensure_active(now),
            Err(DomainError::SessionInactive(_))
        ));
    }

    #[test]
    fn test_stage_timestamps_are_stamped() {
        let now = Utc::now();
        let mut s = session();
        s.identify(ClientId::new(), now).unwrap();
        assert_eq!(s.identified_at, Some(now));
        s.select_service(ServiceId::new(), 5000, now).unwrap();
        assert_eq!(s.service_selected_at, Some(now));
        assert_eq!(s.amount, Some(5000));
        let payment = PaymentId::new();
        s.mark_payment_initiated(payment, now).unwrap();
        assert_eq!(s.data.payment_id, Some(payment));
        assert_eq!(s.step(), 4);
    }

    #[test]
    fn test_select_service_requires_client() {
        let mut s = session();
        let err = s.select_service(ServiceId::new(), 1000, Utc::now());
        assert!(matches!(err, Err(DomainError::NotFound(_))));
        assert_eq!(s.status, SessionStatus::Scanned);
    }

    #[test]
    fn test_token_validation() {
        assert!(SessionToken::parse("qr-table-04").is_ok());
        assert!(SessionToken::parse("short").is_err());
        assert!(SessionToken::parse("has space in it").is_err());
        assert!(SessionToken::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_status_parses_from_wire_name() {
        assert_eq!(
            "payment_initiated".parse::<SessionStatus>().unwrap(),
            SessionStatus::PaymentInitiated
        );
        assert!("paid".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_session_data_keeps_extra_keys() {
        let json = serde_json::json!({"payment_id": PaymentId::new(), "table": "4"});
        let data: SessionData = serde_json::from_value(json).unwrap();
        assert!(data.payment_id.is_some());
        assert_eq!(data.extra["table"], "4");
    }
}
