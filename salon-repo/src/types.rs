//! Shared database types with feature-gated column representations.
//!
//! PostgreSQL stores native UUID / TIMESTAMPTZ / JSONB / BOOLEAN columns.
//! SQLite stores the same values as TEXT (RFC 3339 timestamps, JSON text)
//! and INTEGER flags. The `Db*` aliases and the `*_to_db` / `*_from_db`
//! helpers hide the difference from the adapters.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use salon_types::domain::{
    Client, ClientId, ExternalTransaction, ExternalTransactionId, Gender, HistoryEntryId,
    NotificationFlags, PaymentId, PaymentRecord, PaymentSession, RequestMetadata, Service,
    ServiceId, SessionData, SessionHistoryEntry, SessionId, SessionToken,
};
use salon_types::RepoError;

// ─────────────────────────────────────────────────────────────────────────────
// Feature-gated column types
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub type DbId = Uuid;
#[cfg(not(feature = "postgres"))]
pub type DbId = String;

#[cfg(feature = "postgres")]
pub type DbTimestamp = DateTime<Utc>;
#[cfg(not(feature = "postgres"))]
pub type DbTimestamp = String;

#[cfg(feature = "postgres")]
pub type DbJson = serde_json::Value;
#[cfg(not(feature = "postgres"))]
pub type DbJson = String;

#[cfg(feature = "postgres")]
pub type DbFlag = bool;
#[cfg(not(feature = "postgres"))]
pub type DbFlag = i64;

#[cfg(feature = "postgres")]
pub fn id_to_db(id: Uuid) -> DbId {
    id
}
#[cfg(not(feature = "postgres"))]
pub fn id_to_db(id: Uuid) -> DbId {
    id.to_string()
}

#[cfg(feature = "postgres")]
pub fn id_from_db(id: DbId) -> Result<Uuid, RepoError> {
    Ok(id)
}
#[cfg(not(feature = "postgres"))]
pub fn id_from_db(id: DbId) -> Result<Uuid, RepoError> {
    Uuid::parse_str(&id).map_err(|e| RepoError::Database(e.to_string()))
}

#[cfg(feature = "postgres")]
pub fn ts_to_db(ts: DateTime<Utc>) -> DbTimestamp {
    ts
}
/// Fixed-width UTC timestamps so TEXT columns compare chronologically.
#[cfg(not(feature = "postgres"))]
pub fn ts_to_db(ts: DateTime<Utc>) -> DbTimestamp {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(feature = "postgres")]
pub fn ts_from_db(ts: DbTimestamp) -> Result<DateTime<Utc>, RepoError> {
    Ok(ts)
}
#[cfg(not(feature = "postgres"))]
pub fn ts_from_db(ts: DbTimestamp) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(&ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::Database(e.to_string()))
}

#[cfg(feature = "postgres")]
pub fn json_to_db(value: &serde_json::Value) -> DbJson {
    value.clone()
}
#[cfg(not(feature = "postgres"))]
pub fn json_to_db(value: &serde_json::Value) -> DbJson {
    value.to_string()
}

#[cfg(feature = "postgres")]
pub fn json_from_db(value: DbJson) -> Result<serde_json::Value, RepoError> {
    Ok(value)
}
#[cfg(not(feature = "postgres"))]
pub fn json_from_db(value: DbJson) -> Result<serde_json::Value, RepoError> {
    serde_json::from_str(&value).map_err(|e| RepoError::Database(e.to_string()))
}

#[cfg(feature = "postgres")]
pub fn flag_to_db(flag: bool) -> DbFlag {
    flag
}
#[cfg(not(feature = "postgres"))]
pub fn flag_to_db(flag: bool) -> DbFlag {
    i64::from(flag)
}

#[cfg(feature = "postgres")]
pub fn flag_from_db(flag: DbFlag) -> bool {
    flag
}
#[cfg(not(feature = "postgres"))]
pub fn flag_from_db(flag: DbFlag) -> bool {
    flag != 0
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Maps driver errors, surfacing unique and foreign-key violations.
pub fn db_error(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepoError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return RepoError::Constraint(db.message().to_string());
        }
    }
    RepoError::Database(err.to_string())
}

fn parse_enum<T>(value: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = salon_types::DomainError>,
{
    value
        .parse()
        .map_err(|e: salon_types::DomainError| RepoError::Database(e.to_string()))
}

fn opt_ts(ts: Option<DbTimestamp>) -> Result<Option<DateTime<Utc>>, RepoError> {
    ts.map(ts_from_db).transpose()
}

pub fn opt_ts_to_db(ts: Option<DateTime<Utc>>) -> Option<DbTimestamp> {
    ts.map(ts_to_db)
}

pub fn opt_id_to_db(id: Option<Uuid>) -> Option<DbId> {
    id.map(id_to_db)
}

// ─────────────────────────────────────────────────────────────────────────────
// Column lists
// ─────────────────────────────────────────────────────────────────────────────

pub const CLIENT_COLUMNS: &str =
    "id, last_name, first_name, gender, phone, email, neighborhood, created_at, updated_at";

pub const SERVICE_COLUMNS: &str = "id, name, category, description, price_min, price_max, \
     estimated_minutes, active, created_at";

pub const SESSION_COLUMNS: &str = "id, token, client_id, service_id, amount, status, scanned_at, \
     identified_at, service_selected_at, payment_initiated_at, payment_completed_at, data, \
     expires_at, user_agent, ip_address, device, email_sent, sms_sent, created_at, updated_at, \
     version";

pub const HISTORY_COLUMNS: &str =
    "id, session_id, action, description, payload, ip_address, created_at";

pub const PAYMENT_COLUMNS: &str = "id, session_id, client_id, service_id, amount, method, \
     operator, external_reference, reference_code, status, notes, created_at, updated_at";

pub const EXTERNAL_COLUMNS: &str = "id, payment_id, provider, provider_transaction_id, \
     raw_response, provider_status, created_at, updated_at";

/// Statuses that end a session, as stored.
pub const TERMINAL_SESSION_STATUSES: &str = "'payment_succeeded', 'abandoned', 'expired'";

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbClient {
    pub id: DbId,
    pub last_name: String,
    pub first_name: String,
    pub gender: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub neighborhood: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl DbClient {
    pub fn into_domain(self) -> Result<Client, RepoError> {
        Ok(Client {
            id: ClientId::from_uuid(id_from_db(self.id)?),
            last_name: self.last_name,
            first_name: self.first_name,
            gender: self
                .gender
                .as_deref()
                .map(parse_enum::<Gender>)
                .transpose()?,
            phone: self.phone,
            email: self.email,
            neighborhood: self.neighborhood,
            created_at: ts_from_db(self.created_at)?,
            updated_at: ts_from_db(self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbService {
    pub id: DbId,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price_min: i64,
    pub price_max: Option<i64>,
    pub estimated_minutes: Option<i32>,
    pub active: DbFlag,
    pub created_at: DbTimestamp,
}

impl DbService {
    pub fn into_domain(self) -> Result<Service, RepoError> {
        Ok(Service {
            id: ServiceId::from_uuid(id_from_db(self.id)?),
            name: self.name,
            category: parse_enum(&self.category)?,
            description: self.description,
            price_min: self.price_min,
            price_max: self.price_max,
            estimated_minutes: self.estimated_minutes,
            active: flag_from_db(self.active),
            created_at: ts_from_db(self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbSession {
    pub id: DbId,
    pub token: String,
    pub client_id: Option<DbId>,
    pub service_id: Option<DbId>,
    pub amount: Option<i64>,
    pub status: String,
    pub scanned_at: DbTimestamp,
    pub identified_at: Option<DbTimestamp>,
    pub service_selected_at: Option<DbTimestamp>,
    pub payment_initiated_at: Option<DbTimestamp>,
    pub payment_completed_at: Option<DbTimestamp>,
    pub data: DbJson,
    pub expires_at: Option<DbTimestamp>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device: Option<String>,
    pub email_sent: DbFlag,
    pub sms_sent: DbFlag,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
    pub version: i64,
}

impl DbSession {
    pub fn into_domain(self) -> Result<PaymentSession, RepoError> {
        let data: SessionData = serde_json::from_value(json_from_db(self.data)?)
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(PaymentSession {
            id: SessionId::from_uuid(id_from_db(self.id)?),
            token: SessionToken::parse(&self.token)?,
            client_id: self
                .client_id
                .map(id_from_db)
                .transpose()?
                .map(ClientId::from_uuid),
            service_id: self
                .service_id
                .map(id_from_db)
                .transpose()?
                .map(ServiceId::from_uuid),
            amount: self.amount,
            status: parse_enum(&self.status)?,
            scanned_at: ts_from_db(self.scanned_at)?,
            identified_at: opt_ts(self.identified_at)?,
            service_selected_at: opt_ts(self.service_selected_at)?,
            payment_initiated_at: opt_ts(self.payment_initiated_at)?,
            payment_completed_at: opt_ts(self.payment_completed_at)?,
            data,
            expires_at: opt_ts(self.expires_at)?,
            metadata: RequestMetadata {
                user_agent: self.user_agent,
                ip_address: self.ip_address,
                device: self.device,
            },
            notifications: NotificationFlags {
                email_sent: flag_from_db(self.email_sent),
                sms_sent: flag_from_db(self.sms_sent),
            },
            created_at: ts_from_db(self.created_at)?,
            updated_at: ts_from_db(self.updated_at)?,
            version: self.version,
        })
    }
}

#[derive(FromRow)]
pub struct DbHistoryEntry {
    pub id: DbId,
    pub session_id: DbId,
    pub action: String,
    pub description: String,
    pub payload: DbJson,
    pub ip_address: Option<String>,
    pub created_at: DbTimestamp,
}

impl DbHistoryEntry {
    pub fn into_domain(self) -> Result<SessionHistoryEntry, RepoError> {
        Ok(SessionHistoryEntry {
            id: HistoryEntryId::from_uuid(id_from_db(self.id)?),
            session_id: SessionId::from_uuid(id_from_db(self.session_id)?),
            action: parse_enum(&self.action)?,
            description: self.description,
            payload: json_from_db(self.payload)?,
            ip_address: self.ip_address,
            created_at: ts_from_db(self.created_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbPayment {
    pub id: DbId,
    pub session_id: DbId,
    pub client_id: DbId,
    pub service_id: DbId,
    pub amount: i64,
    pub method: String,
    pub operator: Option<String>,
    pub external_reference: Option<String>,
    pub reference_code: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl DbPayment {
    pub fn into_domain(self) -> Result<PaymentRecord, RepoError> {
        Ok(PaymentRecord {
            id: PaymentId::from_uuid(id_from_db(self.id)?),
            session_id: SessionId::from_uuid(id_from_db(self.session_id)?),
            client_id: ClientId::from_uuid(id_from_db(self.client_id)?),
            service_id: ServiceId::from_uuid(id_from_db(self.service_id)?),
            amount: self.amount,
            method: parse_enum(&self.method)?,
            operator: self.operator.as_deref().map(parse_enum).transpose()?,
            external_reference: self.external_reference,
            reference_code: self.reference_code,
            status: parse_enum(&self.status)?,
            notes: self.notes,
            created_at: ts_from_db(self.created_at)?,
            updated_at: ts_from_db(self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
pub struct DbExternalTransaction {
    pub id: DbId,
    pub payment_id: DbId,
    pub provider: String,
    pub provider_transaction_id: String,
    pub raw_response: DbJson,
    pub provider_status: String,
    pub created_at: DbTimestamp,
    pub updated_at: DbTimestamp,
}

impl DbExternalTransaction {
    pub fn into_domain(self) -> Result<ExternalTransaction, RepoError> {
        Ok(ExternalTransaction {
            id: ExternalTransactionId::from_uuid(id_from_db(self.id)?),
            payment_id: PaymentId::from_uuid(id_from_db(self.payment_id)?),
            provider: self.provider,
            provider_transaction_id: self.provider_transaction_id,
            raw_response: json_from_db(self.raw_response)?,
            provider_status: self.provider_status,
            created_at: ts_from_db(self.created_at)?,
            updated_at: ts_from_db(self.updated_at)?,
        })
    }
}

/// Serializes session data for storage.
pub fn session_data_to_db(data: &SessionData) -> Result<DbJson, RepoError> {
    let value = serde_json::to_value(data).map_err(|e| RepoError::Database(e.to_string()))?;
    Ok(json_to_db(&value))
}
