//! PostgreSQL repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
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
    SESSION_COLUMNS, TERMINAL_SESSION_STATUSES, db_error, session_data_to_db,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
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

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_tables_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_payments_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Change set steps (run inside one transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn insert_session(conn: &mut PgConnection, s: &PaymentSession) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO payment_sessions ({SESSION_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
    ))
    .bind(s.id.into_uuid())
    .bind(s.token.as_str())
    .bind(s.client_id.map(ClientId::into_uuid))
    .bind(s.service_id.map(ServiceId::into_uuid))
    .bind(s.amount)
    .bind(s.status.as_str())
    .bind(s.scanned_at)
    .bind(s.identified_at)
    .bind(s.service_selected_at)
    .bind(s.payment_initiated_at)
    .bind(s.payment_completed_at)
    .bind(session_data_to_db(&s.data)?)
    .bind(s.expires_at)
    .bind(s.metadata.user_agent.as_deref())
    .bind(s.metadata.ip_address.as_deref())
    .bind(s.metadata.device.as_deref())
    .bind(s.notifications.email_sent)
    .bind(s.notifications.sms_sent)
    .bind(s.created_at)
    .bind(s.updated_at)
    .bind(s.version)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn update_session(conn: &mut PgConnection, s: &PaymentSession) -> Result<(), RepoError> {
    // Lock the row so the version check and the write see the same state
    let stored: Option<(i64,)> =
        sqlx::query_as(r#"SELECT version FROM payment_sessions WHERE id = $1 FOR UPDATE"#)
            .bind(s.id.into_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;

    match stored {
        None => return Err(RepoError::NotFound),
        Some((version,)) if version != s.version => {
            warn!(token = %s.token, expected = s.version, found = version, "Stale session version");
            return Err(RepoError::Conflict(format!(
                "Session {} was modified concurrently",
                s.token
            )));
        }
        Some(_) => {}
    }

    sqlx::query(
        r#"UPDATE payment_sessions SET
               client_id = $1, service_id = $2, amount = $3, status = $4,
               identified_at = $5, service_selected_at = $6, payment_initiated_at = $7,
               payment_completed_at = $8, data = $9, expires_at = $10,
               email_sent = $11, sms_sent = $12, updated_at = $13, version = version + 1
           WHERE id = $14"#,
    )
    .bind(s.client_id.map(ClientId::into_uuid))
    .bind(s.service_id.map(ServiceId::into_uuid))
    .bind(s.amount)
    .bind(s.status.as_str())
    .bind(s.identified_at)
    .bind(s.service_selected_at)
    .bind(s.payment_initiated_at)
    .bind(s.payment_completed_at)
    .bind(session_data_to_db(&s.data)?)
    .bind(s.expires_at)
    .bind(s.notifications.email_sent)
    .bind(s.notifications.sms_sent)
    .bind(s.updated_at)
    .bind(s.id.into_uuid())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn insert_payment(conn: &mut PgConnection, p: &PaymentRecord) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO payments ({PAYMENT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
    ))
    .bind(p.id.into_uuid())
    .bind(p.session_id.into_uuid())
    .bind(p.client_id.into_uuid())
    .bind(p.service_id.into_uuid())
    .bind(p.amount)
    .bind(p.method.as_str())
    .bind(p.operator.map(|o| o.as_str()))
    .bind(p.external_reference.as_deref())
    .bind(&p.reference_code)
    .bind(p.status.as_str())
    .bind(p.notes.as_deref())
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn update_payment(conn: &mut PgConnection, u: &PaymentUpdate) -> Result<(), RepoError> {
    let p = &u.payment;
    let result = sqlx::query(
        r#"UPDATE payments SET status = $1, external_reference = $2, notes = $3, updated_at = $4
           WHERE id = $5 AND status = $6"#,
    )
    .bind(p.status.as_str())
    .bind(p.external_reference.as_deref())
    .bind(p.notes.as_deref())
    .bind(p.updated_at)
    .bind(p.id.into_uuid())
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

async fn write_external(conn: &mut PgConnection, write: &ExternalWrite) -> Result<(), RepoError> {
    match write {
        ExternalWrite::Insert(tx) => {
            sqlx::query(&format!(
                "INSERT INTO external_transactions ({EXTERNAL_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(tx.id.into_uuid())
            .bind(tx.payment_id.into_uuid())
            .bind(&tx.provider)
            .bind(&tx.provider_transaction_id)
            .bind(&tx.raw_response)
            .bind(&tx.provider_status)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }
        ExternalWrite::Update(tx) => {
            let result = sqlx::query(
                r#"UPDATE external_transactions
                   SET provider_transaction_id = $1, raw_response = $2, provider_status = $3, updated_at = $4
                   WHERE id = $5"#,
            )
            .bind(&tx.provider_transaction_id)
            .bind(&tx.raw_response)
            .bind(&tx.provider_status)
            .bind(tx.updated_at)
            .bind(tx.id.into_uuid())
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
    conn: &mut PgConnection,
    entry: &SessionHistoryEntry,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO session_history ({HISTORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
    ))
    .bind(entry.id.into_uuid())
    .bind(entry.session_id.into_uuid())
    .bind(entry.action.as_str())
    .bind(&entry.description)
    .bind(&entry.payload)
    .bind(entry.ip_address.as_deref())
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SalonRepository for PostgresRepo {
    async fn find_client_by_phone(&self, phone: &str) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbClient::into_domain).transpose()
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError> {
        let row: Option<DbClient> =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"))
                .bind(id.into_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(DbClient::into_domain).transpose()
    }

    async fn create_client(&self, client: &Client) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(client.id.into_uuid())
        .bind(&client.last_name)
        .bind(&client.first_name)
        .bind(client.gender.map(|g| g.as_str()))
        .bind(&client.phone)
        .bind(client.email.as_deref())
        .bind(client.neighborhood.as_deref())
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, RepoError> {
        let row: Option<DbService> =
            sqlx::query_as(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"))
                .bind(id.into_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(DbService::into_domain).transpose()
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, RepoError> {
        let filter = if active_only { "WHERE active" } else { "" };
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
            "INSERT INTO services ({SERVICE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(service.id.into_uuid())
        .bind(&service.name)
        .bind(service.category.as_str())
        .bind(service.description.as_deref())
        .bind(service.price_min)
        .bind(service.price_max)
        .bind(service.estimated_minutes)
        .bind(service.active)
        .bind(service.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PaymentSession>, RepoError> {
        let row: Option<DbSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE id = $1"
        ))
        .bind(id.into_uuid())
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
            "SELECT {SESSION_COLUMNS} FROM payment_sessions WHERE token = $1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(DbSession::into_domain).transpose()
    }

    async fn session_history(&self, id: SessionId) -> Result<Vec<SessionHistoryEntry>, RepoError> {
        let rows: Vec<DbHistoryEntry> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM session_history WHERE session_id = $1 ORDER BY seq"
        ))
        .bind(id.into_uuid())
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
               AND ((expires_at IS NOT NULL AND expires_at <= $1)
                 OR (expires_at IS NULL AND created_at <= $2))
             ORDER BY created_at
             LIMIT $3"
        ))
        .bind(now)
        .bind(now - Duration::hours(SESSION_TTL_HOURS))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DbSession::into_domain).collect()
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>, RepoError> {
        let row: Option<DbPayment> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
                .bind(id.into_uuid())
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
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE session_id = $1 ORDER BY created_at"
        ))
        .bind(id.into_uuid())
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
                 WHERE provider = $1 AND provider_transaction_id = $2)
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
             WHERE payment_id = $1 AND provider = $2"
        ))
        .bind(payment_id.into_uuid())
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
             WHERE payment_id = $1 ORDER BY created_at"
        ))
        .bind(payment_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(DbExternalTransaction::into_domain)
            .collect()
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<(), RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let locked: Option<(uuid::Uuid,)> =
            sqlx::query_as(r#"SELECT id FROM payments WHERE id = $1 FOR UPDATE"#)
                .bind(id.into_uuid())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(db_error)?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }

        let (linked,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM external_transactions WHERE payment_id = $1")
                .bind(id.into_uuid())
                .fetch_one(&mut *db_tx)
                .await
                .map_err(db_error)?;
        if linked > 0 {
            return Err(RepoError::Constraint(format!(
                "Payment {id} is referenced by {linked} external transaction(s)"
            )));
        }

        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&mut *db_tx)
            .await
            .map_err(db_error)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;
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
