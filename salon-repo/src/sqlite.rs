//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, warn};

use salon_types::domain::{
    Client, ClientId, ExternalTransaction, PaymentId, PaymentRecord, PaymentSession,
    SESSION_TTL_HOURS, Service, ServiceId, SessionHistoryEntry, SessionId, SessionToken,
};
use salon_types::ports::{ChangeSet, ExternalWrite, PaymentUpdate, SalonRepository};
use salon_types::RepoError;

use crate::types::{
    CLIENT_COLUMNS, DbClient, DbExternalTransaction, DbHistoryEntry, DbPayment, DbService,
    DbSession, EXTERNAL_COLUMNS, HISTORY_COLUMNS, PAYMENT_COLUMNS, SERVICE_COLUMNS,
    SESSION_COLUMNS, TERMINAL_SESSION_STATUSES, db_error, flag_to_db, id_to_db, json_to_db,
    opt_id_to_db, opt_ts_to_db, session_data_to_db, ts_to_db,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &SqlitePool, sql: &str, name: &str) -> anyhow::Result<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    debug!(migration = name, "Migration applied");
    Ok(())
}

async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_tables.sql"),
        "0001",
    )
    .await?;
    execute_migration(
        pool,
        include_str!("../migrations/0002_create_payments.sql"),
        "0002",
    )
    .await?;
    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every in-memory connection is its own database, so pin one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Change set steps (run inside one transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn insert_session(conn: &mut SqliteConnection, s: &PaymentSession) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO payment_sessions ({SESSION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(id_to_db(s.id.into_uuid()))
    .bind(s.token.as_str())
    .bind(opt_id_to_db(s.client_id.map(ClientId::into_uuid)))
    .bind(opt_id_to_db(s.service_id.map(ServiceId::into_uuid)))
    .bind(s.amount)
    .bind(s.status.as_str())
    .bind(ts_to_db(s.scanned_at))
    .bind(opt_ts_to_db(s.identified_at))
    .bind(opt_ts_to_db(s.service_selected_at))
    .bind(opt_ts_to_db(s.payment_initiated_at))
    .bind(opt_ts_to_db(s.payment_completed_at))
    .bind(session_data_to_db(&s.data)?)
    .bind(opt_ts_to_db(s.expires_at))
    .bind(s.metadata.user_agent.as_deref())
    .bind(s.metadata.ip_address.as_deref())
    .bind(s.metadata.device.as_deref())
    .bind(flag_to_db(s.notifications.email_sent))
    .bind(flag_to_db(s.notifications.sms_sent))
    .bind(ts_to_db(s.created_at))
    .bind(ts_to_db(s.updated_at))
    .bind(s.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn update_session(conn: &mut SqliteConnection, s: &PaymentSession) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"UPDATE payment_sessions SET
               client_id = ?, service_id = ?, amount = ?, status = ?,
               identified_at = ?, service_selected_at = ?, payment_initiated_at = ?,
               payment_completed_at = ?, data = ?, expires_at = ?,
               email_sent = ?, sms_sent = ?, updated_at = ?, version = version + 1
           WHERE id = ? AND version = ?"#,
    )
    .bind(opt_id_to_db(s.client_id.map(ClientId::into_uuid)))
    .bind(opt_id_to_db(s.service_id.map(ServiceId::into_uuid)))
    .bind(s.amount)
    .bind(s.status.as_str())
    .bind(opt_ts_to_db(s.identified_at))
    .bind(opt_ts_to_db(s.service_selected_at))
    .bind(opt_ts_to_db(s.payment_initiated_at))
    .bind(opt_ts_to_db(s.payment_completed_at))
    .bind(session_data_to_db(&s.data)?)
    .bind(opt_ts_to_db(s.expires_at))
    .bind(flag_to_db(s.notifications.email_sent))
    .bind(flag_to_db(s.notifications.sms_sent))
    .bind(ts_to_db(s.updated_at))
    .bind(id_to_db(s.id.into_uuid()))
    .bind(s.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        warn!(token = %s.token, version = s.version, "Stale session version");
        return Err(RepoError::Conflict(format!(
            "Session {} was modified concurrently",
            s.token
        )));
    }
    Ok(())
}

async fn insert_payment(conn: &mut SqliteConnection, p: &PaymentRecord) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(id_to_db(p.id.into_uuid()))
    .bind(id_to_db(p.session_id.into_uuid()))
    .bind(id_to_db(p.client_id.into_uuid()))
    .bind(id_to_db(p.service_id.into_uuid()))
    .bind(p.amount)
    .bind(p.method.as_str())
    .bind(p.operator.map(|o| o.as_str()))
    .bind(p.external_reference.as_deref())
    .bind(&p.reference_code)
    .bind(p.status.as_str())
    .bind(p.notes.as_deref())
    .bind(ts_to_db(p.created_at))
    .bind(ts_to_db(p.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn update_payment(conn: &mut SqliteConnection, u: &PaymentUpdate) -> Result<(), RepoError> {
    let p = &u.payment;
    let result = sqlx::query(
        r#"UPDATE payments SET status = ?, external_reference = ?, notes = ?, updated_at = ?
           WHERE id = ? AND status = ?"#,
    )
    .bind(p.status.as_str())
    .bind(p.external_reference.as_deref())
    .bind(p.notes.as_deref())
    .bind(ts_to_db(p.updated_at))
    .bind(id_to_db(p.id.into_uuid()))
    .bind(u.expected_status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "Payment {} is no longer {}",
            p.reference_code, u.expected_status
        )));
    }
    Ok(())
}

async fn write_external(conn: &mut SqliteConnection, write: &ExternalWrite) -> Result<(), RepoError> {
    match write {
        ExternalWrite::Insert(tx) => {
            sqlx::query(&format!(
                "INSERT INTO external_transactions ({EXTERNAL_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(id_to_db(tx.id.into_uuid()))
            .bind(id_to_db(tx.payment_id.into_uuid()))
            .bind(&tx.provider)
            .bind(&tx.provider_transaction_id)
            .bind(json_to_db(&tx.raw_response))
            .bind(&tx.provider_status)
            .bind(ts_to_db(tx.created_at))
            .bind(ts_to_db(tx.updated_at))
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }
        ExternalWrite::Update(tx) => {
            let result = sqlx::query(
                r#"UPDATE external_transactions
                   SET provider_transaction_id = ?, raw_response = ?, provider_status = ?, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(&tx.provider_transaction_id)
            .bind(json_to_db(&tx.raw_response))
            .bind(&tx.provider_status)
            .bind(ts_to_db(tx.updated_at))
            .bind(id_to_db(tx.id.into_uuid()))
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
        }
    }
    Ok(())
}

async fn insert_history(
    conn: &mut SqliteConnection,
    entry: &SessionHistoryEntry,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO session_history ({HISTORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(id_to_db(entry.id.into_uuid()))
    .bind(id_to_db(entry.session_id.into_uuid()))
    .bind(entry.action.as_str())
    .bind(&entry.description)
    .bind(json_to_db(&entry.payload))
    .bind(entry.ip_address.as_deref())
    .bind(ts_to_db(entry.created_at))
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SalonRepository for SqliteRepo {
    async fn find_client_by_phone(&self, phone: &str) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE phone = ?"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbClient::into_domain).transpose()
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"))
                .bind(id_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(DbClient::into_domain).transpose()
    }

    async fn create_client(&self, client: &Client) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(id_to_db(client.id.into_uuid()))
        .bind(&client.last_name)
        .bind(&client.first_name)
        .bind(client.gender.map(|g| g.as_str()))
        .bind(&client.phone)
        .bind(client.email.as_deref())
        .bind(client.neighborhood.as_deref())
        .bind(ts_to_db(client.created_at))
        .bind(ts_to_db(client.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, RepoError> {
        let row: Option<DbService> =
            sqlx::query_as(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
                .bind(id_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(DbService::into_domain).transpose()
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, RepoError> {
        let filter = if active_only { "WHERE active = 1" } else { "" };
        let rows: Vec<DbService> = sqlx::query_as(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services {filter} ORDER BY category, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbService::into_domain).collect()
    }

    async fn create_service(&self, service: &Service) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO services ({SERVICE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(id_to_db(service.id.into_uuid()))
        .bind(&service.name)
        .bind(service.category.as_str())
        .bind(service.description.as_deref())
        .bind(service.price_min)
        .bind(service.price_max)
        .bind(service.estimated_minutes)
        .bind(flag_to_db(service.active))
        .bind(ts_to_db(service.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PaymentSession>, RepoError> {
        let row: Option<DbSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE id = ?"
        ))
        .bind(id_to_db(id.into_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbSession::into_domain).transpose()
    }

    async fn find_session_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<PaymentSession>, RepoError> {
        let row: Option<DbSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE token = ?"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbSession::into_domain).transpose()
    }

    async fn session_history(&self, id: SessionId) -> Result<Vec<SessionHistoryEntry>, RepoError> {
        let rows: Vec<DbHistoryEntry> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM session_history WHERE session_id = ? ORDER BY seq"
        ))
        .bind(id_to_db(id.into_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbHistoryEntry::into_domain).collect()
    }

    async fn list_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>, RepoError> {
        let rows: Vec<DbSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions
             WHERE status NOT IN ({TERMINAL_SESSION_STATUSES})
               AND ((expires_at IS NOT NULL AND expires_at <= ?)
                 OR (expires_at IS NULL AND created_at <= ?))
             ORDER BY created_at
             LIMIT ?"
        ))
        .bind(ts_to_db(now))
        .bind(ts_to_db(now - Duration::hours(SESSION_TTL_HOURS)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbSession::into_domain).collect()
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>, RepoError> {
        let row: Option<DbPayment> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"))
                .bind(id_to_db(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn list_session_payments(
        &self,
        id: SessionId,
    ) -> Result<Vec<PaymentRecord>, RepoError> {
        let rows: Vec<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE session_id = ? ORDER BY created_at"
        ))
        .bind(id_to_db(id.into_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbPayment::into_domain).collect()
    }

    async fn find_payment_by_external(
        &self,
        provider: &str,
        provider_transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id IN (
                 SELECT payment_id FROM external_transactions
                 WHERE provider = ? AND provider_transaction_id = ?)
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(provider)
        .bind(provider_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_external_transaction(
        &self,
        payment_id: PaymentId,
        provider: &str,
    ) -> Result<Option<ExternalTransaction>, RepoError> {
        let row: Option<DbExternalTransaction> = sqlx::query_as(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE payment_id = ? AND provider = ?"
        ))
        .bind(id_to_db(payment_id.into_uuid()))
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbExternalTransaction::into_domain).transpose()
    }

    async fn list_external_transactions(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<ExternalTransaction>, RepoError> {
        let rows: Vec<DbExternalTransaction> = sqlx::query_as(&format!(
            "SELECT {EXTERNAL_COLUMNS} FROM external_transactions
             WHERE payment_id = ? ORDER BY created_at"
        ))
        .bind(id_to_db(payment_id.into_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(DbExternalTransaction::into_domain)
            .collect()
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<(), RepoError> {
        let id_str = id_to_db(id.into_uuid());

        let (linked,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM external_transactions WHERE payment_id = ?")
                .bind(&id_str)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;
        if linked > 0 {
            return Err(RepoError::Constraint(format!(
                "Payment {id} is referenced by {linked} external transaction(s)"
            )));
        }

        let result = sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), RepoError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        if let Some(session) = &changes.new_session {
            insert_session(&mut *db_tx, session).await?;
        }
        if let Some(session) = &changes.session_update {
            update_session(&mut *db_tx, session).await?;
        }
        if let Some(payment) = &changes.new_payment {
            insert_payment(&mut *db_tx, payment).await?;
        }
        if let Some(update) = &changes.payment_update {
            update_payment(&mut *db_tx, update).await?;
        }
        if let Some(write) = &changes.external {
            write_external(&mut *db_tx, write).await?;
        }
        for entry in &changes.history {
            insert_history(&mut *db_tx, entry).await?;
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(())
    }
}
