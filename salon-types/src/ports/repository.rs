//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory mocks) implement this trait.

use chrono::{DateTime, Utc};

use crate::domain::{
    Client, ClientId, ExternalTransaction, PaymentId, PaymentRecord, PaymentSession,
    PaymentStatus, Service, ServiceId, SessionHistoryEntry, SessionId, SessionToken,
};
use crate::error::RepoError;

/// A payment update guarded by the status the caller last observed.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment: PaymentRecord,
    pub expected_status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub enum ExternalWrite {
    Insert(ExternalTransaction),
    Update(ExternalTransaction),
}

/// Every write belonging to one workflow step.
///
/// Adapters apply a change set inside a single database transaction:
/// either all rows land or none do.
///
/// - `session_update` is compared against the stored `version` and fails
///   with [`RepoError::Conflict`] when another writer got there first.
/// - `payment_update` is compared against `expected_status` the same way.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub new_session: Option<PaymentSession>,
    pub session_update: Option<PaymentSession>,
    pub new_payment: Option<PaymentRecord>,
    pub payment_update: Option<PaymentUpdate>,
    pub external: Option<ExternalWrite>,
    pub history: Vec<SessionHistoryEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(mut self, session: PaymentSession) -> Self {
        self.new_session = Some(session);
        self
    }

    pub fn update_session(mut self, session: PaymentSession) -> Self {
        self.session_update = Some(session);
        self
    }

    pub fn insert_payment(mut self, payment: PaymentRecord) -> Self {
        self.new_payment = Some(payment);
        self
    }

    pub fn update_payment(mut self, payment: PaymentRecord, expected_status: PaymentStatus) -> Self {
        self.payment_update = Some(PaymentUpdate {
            payment,
            expected_status,
        });
        self
    }

    pub fn insert_external(mut self, tx: ExternalTransaction) -> Self {
        self.external = Some(ExternalWrite::Insert(tx));
        self
    }

    pub fn update_external(mut self, tx: ExternalTransaction) -> Self {
        self.external = Some(ExternalWrite::Update(tx));
        self
    }

    pub fn record(mut self, entry: SessionHistoryEntry) -> Self {
        self.history.push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_session.is_none()
            && self.session_update.is_none()
            && self.new_payment.is_none()
            && self.payment_update.is_none()
            && self.external.is_none()
            && self.history.is_empty()
    }
}

/// Persistence port for the salon workflow.
#[async_trait::async_trait]
pub trait SalonRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Clients & catalog
    // ─────────────────────────────────────────────────────────────────────────────

    async fn find_client_by_phone(&self, phone: &str) -> Result<Option<Client>, RepoError>;

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, RepoError>;

    /// Inserts a client. A taken phone number yields [`RepoError::Conflict`].
    async fn create_client(&self, client: &Client) -> Result<(), RepoError>;

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, RepoError>;

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, RepoError>;

    async fn create_service(&self, service: &Service) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_session(&self, id: SessionId) -> Result<Option<PaymentSession>, RepoError>;

    async fn find_session_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<PaymentSession>, RepoError>;

    /// History entries in insertion order.
    async fn session_history(&self, id: SessionId) -> Result<Vec<SessionHistoryEntry>, RepoError>;

    /// Non-terminal sessions whose expiry is at or before `now`.
    async fn list_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentSession>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>, RepoError>;

    /// Payments of a session, oldest first.
    async fn list_session_payments(&self, id: SessionId)
    -> Result<Vec<PaymentRecord>, RepoError>;

    /// Resolves a payment from the provider's transaction id.
    async fn find_payment_by_external(
        &self,
        provider: &str,
        provider_transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, RepoError>;

    async fn find_external_transaction(
        &self,
        payment_id: PaymentId,
        provider: &str,
    ) -> Result<Option<ExternalTransaction>, RepoError>;

    async fn list_external_transactions(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<ExternalTransaction>, RepoError>;

    /// Deletes a payment. Fails with [`RepoError::Constraint`] while external
    /// transactions still reference it.
    async fn delete_payment(&self, id: PaymentId) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Atomic writes
    // ─────────────────────────────────────────────────────────────────────────────

    async fn apply(&self, changes: ChangeSet) -> Result<(), RepoError>;
}
