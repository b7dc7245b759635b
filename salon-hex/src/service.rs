//! Session Application Service
//!
//! Drives the payment-session state machine through the repository port and
//! delegates checkout initiation to the payment gateway.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! Every mutation follows the same shape: take the session lock, re-read the
//! session, validate, then commit one [`ChangeSet`] (session row, payment,
//! provider record and history entries together).

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use salon_types::domain::{NewPayment, normalize_phone};
use salon_types::ports::ChangeSet;
use salon_types::{
    AppError, Client, ClientResponse, DirectAuthRequest, ExternalTransaction, HistoryAction,
    IdentifyClientRequest, InitiatePaymentRequest, NewClient, NewService, PaymentId,
    PaymentRecord, PaymentResponse, PaymentSession, PaymentStatus, RepoError, RequestMetadata,
    SalonRepository, SelectServiceRequest, Service, ServiceResponse, SessionHistoryEntry,
    SessionStatus, SessionSummary, SessionToken, Settlement, StartSessionRequest,
};

use crate::gateway::PaymentGateway;
use crate::locks::{SessionGuard, SessionLocks};
use crate::summary::{Locale, thank_you_message};

/// Caller details recorded with sessions and history entries.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A session after client identification.
#[derive(Debug, Clone)]
pub struct ClientIdentification {
    pub session: PaymentSession,
    pub client: Client,
    /// True when the phone number was unknown and a client was registered.
    pub created: bool,
}

/// Result of a successful payment initiation.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub payment: PaymentRecord,
    pub session: PaymentSession,
    /// Provider checkout page; `None` for immediately settled methods.
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub session: PaymentSession,
    pub history: Vec<SessionHistoryEntry>,
}

#[derive(Debug, Clone)]
pub struct PaymentDetail {
    pub payment: PaymentRecord,
    pub session_token: SessionToken,
    pub external_transactions: Vec<ExternalTransaction>,
}

/// Application service for the salon payment journey.
///
/// Generic over `R: SalonRepository` - the adapter is injected at compile time.
pub struct SessionService<R: SalonRepository> {
    pub(crate) repo: R,
    pub(crate) gateway: PaymentGateway,
    pub(crate) locks: SessionLocks,
}

pub(crate) fn history_entry(
    session: &PaymentSession,
    action: HistoryAction,
    description: impl Into<String>,
    payload: serde_json::Value,
    ip_address: Option<&str>,
    now: DateTime<Utc>,
) -> SessionHistoryEntry {
    SessionHistoryEntry::new(
        session.id,
        action,
        description,
        payload,
        ip_address.map(str::to_string),
        now,
    )
}

/// Unknown and malformed tokens both read as "no such session".
fn parse_token(raw: &str) -> Result<SessionToken, AppError> {
    SessionToken::parse(raw).map_err(|_| AppError::NotFound(format!("Session {raw}")))
}

impl<R: SalonRepository> SessionService<R> {
    pub fn new(repo: R, gateway: PaymentGateway) -> Self {
        Self {
            repo,
            gateway,
            locks: SessionLocks::new(),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn gateway(&self) -> &PaymentGateway {
        &self.gateway
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────────

    async fn load(&self, token: &SessionToken) -> Result<PaymentSession, AppError> {
        self.repo
            .find_session_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {token}")))
    }

    /// Locks the session and returns a fresh copy read under the lock.
    pub(crate) async fn lock_session(
        &self,
        raw: &str,
    ) -> Result<(SessionGuard<'_>, PaymentSession), AppError> {
        let token = parse_token(raw)?;
        let id = self.load(&token).await?.id;
        let guard = self.locks.acquire(id).await;
        let session = self
            .repo
            .get_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {token}")))?;
        Ok((guard, session))
    }

    /// Persists `changes` together with the session row, then tracks the
    /// version bump the repository applied.
    pub(crate) async fn commit(
        &self,
        session: &mut PaymentSession,
        changes: ChangeSet,
    ) -> Result<(), AppError> {
        self.repo
            .apply(changes.update_session(session.clone()))
            .await?;
        session.version += 1;
        Ok(())
    }

    async fn find_or_create_client(
        &self,
        phone: &str,
        data: Option<NewClient>,
        now: DateTime<Utc>,
    ) -> Result<(Client, bool), AppError> {
        let phone = normalize_phone(phone)?;
        if let Some(client) = self.repo.find_client_by_phone(&phone).await? {
            return Ok((client, false));
        }

        let data = data.ok_or_else(|| {
            AppError::Validation(format!(
                "Phone number {phone} is not registered: first and last name are required"
            ))
        })?;
        let client = Client::new(&phone, data, now)?;
        match self.repo.create_client(&client).await {
            Ok(()) => {
                info!(client_id = %client.id, "Client registered");
                Ok((client, true))
            }
            Err(RepoError::Conflict(_)) => Err(AppError::Validation(format!(
                "Phone number {phone} is already registered to another client"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session journey
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a session after a QR scan.
    #[instrument(skip(self, req, ctx))]
    pub async fn start_session(
        &self,
        req: StartSessionRequest,
        ctx: RequestContext,
    ) -> Result<PaymentSession, AppError> {
        let token = req
            .session_id
            .as_deref()
            .map(SessionToken::parse)
            .transpose()?;
        let now = Utc::now();
        let metadata = RequestMetadata {
            user_agent: ctx.user_agent,
            ip_address: ctx.ip_address.clone(),
            device: req.device,
        };
        let session = PaymentSession::start(token, metadata, now);
        let entry = history_entry(
            &session,
            HistoryAction::Scan,
            "QR code scanned",
            json!({ "device": session.metadata.device }),
            ctx.ip_address.as_deref(),
            now,
        );

        self.repo
            .apply(
                ChangeSet::new()
                    .insert_session(session.clone())
                    .record(entry),
            )
            .await?;

        info!(session = %session.token, "Session started");
        Ok(session)
    }

    /// Starts (or resumes) a session and identifies the client in one call.
    #[instrument(skip(self, req, ctx), fields(phone = %req.phone))]
    pub async fn direct_auth(
        &self,
        req: DirectAuthRequest,
        ctx: RequestContext,
    ) -> Result<ClientIdentification, AppError> {
        let token = req
            .session_id
            .as_deref()
            .map(SessionToken::parse)
            .transpose()?;

        if let Some(token) = &token {
            if self.repo.find_session_by_token(token).await?.is_some() {
                return self
                    .identify_with(
                        token.as_str(),
                        &req.phone,
                        req.client,
                        HistoryAction::DirectAuth,
                        ctx,
                    )
                    .await;
            }
        }

        let now = Utc::now();
        let (client, created) = self
            .find_or_create_client(&req.phone, req.client, now)
            .await?;

        let metadata = RequestMetadata {
            user_agent: ctx.user_agent,
            ip_address: ctx.ip_address.clone(),
            device: None,
        };
        let mut session = PaymentSession::start(token, metadata, now);
        session.identify(client.id, now)?;

        let mut changes = ChangeSet::new().insert_session(session.clone());
        if created {
            changes = changes.record(history_entry(
                &session,
                HistoryAction::ClientCreate,
                format!("Client {} registered", client.full_name()),
                json!({ "client_id": client.id, "phone": client.phone }),
                ctx.ip_address.as_deref(),
                now,
            ));
        }
        changes = changes.record(history_entry(
            &session,
            HistoryAction::DirectAuth,
            format!("Direct authentication of {}", client.full_name()),
            json!({ "client_id": client.id, "created": created }),
            ctx.ip_address.as_deref(),
            now,
        ));
        self.repo.apply(changes).await?;

        info!(session = %session.token, client_id = %client.id, created, "Direct authentication");
        Ok(ClientIdentification {
            session,
            client,
            created,
        })
    }

    /// Looks the client up by phone (registering them when unknown) and
    /// moves the session to `identification`.
    #[instrument(skip(self, req, ctx), fields(session = %raw))]
    pub async fn identify_client(
        &self,
        raw: &str,
        req: IdentifyClientRequest,
        ctx: RequestContext,
    ) -> Result<ClientIdentification, AppError> {
        self.identify_with(raw, &req.phone, req.client, HistoryAction::ClientLookup, ctx)
            .await
    }

    async fn identify_with(
        &self,
        raw: &str,
        phone: &str,
        data: Option<NewClient>,
        lookup_action: HistoryAction,
        ctx: RequestContext,
    ) -> Result<ClientIdentification, AppError> {
        let (_guard, mut session) = self.lock_session(raw).await?;
        let now = Utc::now();
        session.ensure_active(now)?;
        if !session.status.can_transition_to(SessionStatus::Identification) {
            return Err(AppError::InvalidTransition {
                from: session.status,
                to: SessionStatus::Identification,
            });
        }

        let (client, created) = self.find_or_create_client(phone, data, now).await?;
        session.identify(client.id, now)?;

        let (action, description) = if created {
            (
                HistoryAction::ClientCreate,
                format!("Client {} registered", client.full_name()),
            )
        } else {
            (
                lookup_action,
                format!("Client {} identified", client.full_name()),
            )
        };
        let entry = history_entry(
            &session,
            action,
            description,
            json!({ "client_id": client.id, "phone": client.phone, "created": created }),
            ctx.ip_address.as_deref(),
            now,
        );
        self.commit(&mut session, ChangeSet::new().record(entry))
            .await?;

        info!(client_id = %client.id, created, "Client identified");
        Ok(ClientIdentification {
            session,
            client,
            created,
        })
    }

    /// Records the chosen service; the amount must fall inside its price band.
    #[instrument(skip(self, req, ctx), fields(session = %raw, service_id = %req.service_id))]
    pub async fn select_service(
        &self,
        raw: &str,
        req: SelectServiceRequest,
        ctx: RequestContext,
    ) -> Result<PaymentSession, AppError> {
        let (_guard, mut session) = self.lock_session(raw).await?;
        let now = Utc::now();
        session.ensure_active(now)?;

        let service = self
            .repo
            .get_service(req.service_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| AppError::NotFound(format!("Service {}", req.service_id)))?;
        let amount = service.resolve_amount(req.amount)?;
        session.select_service(service.id, amount, now)?;

        let entry = history_entry(
            &session,
            HistoryAction::ServiceSelection,
            format!("Service '{}' selected", service.name),
            json!({ "service_id": service.id, "service": service.name, "amount": amount }),
            ctx.ip_address.as_deref(),
            now,
        );
        self.commit(&mut session, ChangeSet::new().record(entry))
            .await?;

        info!(amount, "Service selected");
        Ok(session)
    }

    /// Creates a payment for the session and settles it, either on the spot
    /// or by opening a provider checkout.
    #[instrument(skip(self, req, ctx), fields(session = %raw, method = %req.method))]
    pub async fn initiate_payment(
        &self,
        raw: &str,
        req: InitiatePaymentRequest,
        ctx: RequestContext,
    ) -> Result<PaymentInitiation, AppError> {
        let (_guard, mut session) = self.lock_session(raw).await?;
        let now = Utc::now();
        session.ensure_active(now)?;
        if !session.status.can_transition_to(SessionStatus::PaymentInitiated) {
            return Err(AppError::InvalidTransition {
                from: session.status,
                to: SessionStatus::PaymentInitiated,
            });
        }

        let (Some(client_id), Some(service_id)) = (session.client_id, session.service_id) else {
            return Err(AppError::NotFound(format!(
                "Session {} has no client or service yet",
                session.token
            )));
        };
        let amount = session.amount.ok_or_else(|| {
            AppError::Validation(format!("Session {} has no agreed amount", session.token))
        })?;

        let mut payment = PaymentRecord::new(
            NewPayment {
                session_id: session.id,
                client_id,
                service_id,
                amount,
                method: req.method,
                operator: req.operator,
                notes: None,
            },
            now,
        )?;
        let ip = ctx.ip_address.as_deref();

        match self.gateway.route(req.method) {
            Settlement::Immediate => {
                payment.advance(PaymentStatus::Succeeded, now)?;
                session.mark_payment_initiated(payment.id, now)?;
                let initiated = history_entry(
                    &session,
                    HistoryAction::PaymentInitiation,
                    format!("{} payment of {amount} FCFA", payment.method_label()),
                    json!({ "payment_id": payment.id, "method": payment.method, "amount": amount }),
                    ip,
                    now,
                );
                session.transition(SessionStatus::PaymentSucceeded, now)?;
                let confirmed = history_entry(
                    &session,
                    HistoryAction::PaymentConfirmation,
                    "Payment settled on the spot",
                    json!({ "payment_id": payment.id, "reference": payment.reference_code }),
                    ip,
                    now,
                );

                self.commit(
                    &mut session,
                    ChangeSet::new()
                        .insert_payment(payment.clone())
                        .record(initiated)
                        .record(confirmed),
                )
                .await?;

                info!(payment_id = %payment.id, "Payment settled immediately");
                Ok(PaymentInitiation {
                    payment,
                    session,
                    redirect_url: None,
                })
            }
            Settlement::Provider(provider) => {
                let client = self
                    .repo
                    .get_client(client_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Client {client_id}")))?;
                let service = self
                    .repo
                    .get_service(service_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Service {service_id}")))?;

                // The attempt is on record before the provider hears about it
                self.repo
                    .apply(ChangeSet::new().insert_payment(payment.clone()))
                    .await?;

                match self
                    .gateway
                    .initiate(&provider, &payment, &session, &client, &service)
                    .await
                {
                    Ok(checkout) => {
                        let external = ExternalTransaction::initiated(
                            payment.id,
                            provider.as_str(),
                            checkout.provider_transaction_id.as_str(),
                            checkout.raw.clone(),
                            now,
                        );
                        payment.advance(PaymentStatus::InProgress, now)?;
                        payment.external_reference = Some(checkout.provider_transaction_id.clone());
                        session.mark_payment_initiated(payment.id, now)?;
                        let entry = history_entry(
                            &session,
                            HistoryAction::PaymentInitiation,
                            format!("{} checkout opened with {provider}", payment.method_label()),
                            json!({
                                "payment_id": payment.id,
                                "provider": provider,
                                "method": payment.method,
                                "operator": payment.operator,
                                "amount": amount,
                                "redirect_url": checkout.redirect_url,
                            }),
                            ip,
                            now,
                        );

                        let opened = self
                            .commit(
                                &mut session,
                                ChangeSet::new()
                                    .update_payment(payment.clone(), PaymentStatus::Pending)
                                    .insert_external(external.clone())
                                    .record(entry),
                            )
                            .await;
                        if let Err(e) = opened {
                            // The checkout is live but the session never moved
                            error!(
                                payment_id = %payment.id,
                                %provider,
                                error = %e,
                                "Opened checkout could not be recorded"
                            );
                            payment.advance(PaymentStatus::Failed, now)?;
                            payment.notes = Some(format!(
                                "Checkout {} opened with {provider} but not recorded: {e}",
                                checkout.provider_transaction_id
                            ));
                            let entry = history_entry(
                                &session,
                                HistoryAction::PaymentFailure,
                                "The payment could not be recorded, please try again",
                                json!({
                                    "payment_id": payment.id,
                                    "provider": provider,
                                    "error": e.to_string(),
                                }),
                                ip,
                                now,
                            );
                            self.repo
                                .apply(
                                    ChangeSet::new()
                                        .update_payment(payment, PaymentStatus::Pending)
                                        .insert_external(external)
                                        .record(entry),
                                )
                                .await?;
                            return Err(e);
                        }

                        info!(payment_id = %payment.id, %provider, "Provider checkout opened");
                        Ok(PaymentInitiation {
                            payment,
                            session,
                            redirect_url: Some(checkout.redirect_url),
                        })
                    }
                    Err(e) => {
                        warn!(payment_id = %payment.id, %provider, error = %e, "Payment initiation failed");
                        payment.advance(PaymentStatus::Failed, now)?;
                        payment.notes = Some(e.user_message());
                        let entry = history_entry(
                            &session,
                            HistoryAction::PaymentFailure,
                            e.user_message(),
                            json!({
                                "payment_id": payment.id,
                                "provider": provider,
                                "error": e.to_string(),
                            }),
                            ip,
                            now,
                        );
                        self.repo
                            .apply(
                                ChangeSet::new()
                                    .update_payment(payment, PaymentStatus::Pending)
                                    .record(entry),
                            )
                            .await?;
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// User-driven exit from the journey.
    #[instrument(skip(self, ctx), fields(session = %raw))]
    pub async fn abandon(&self, raw: &str, ctx: RequestContext) -> Result<PaymentSession, AppError> {
        let (_guard, mut session) = self.lock_session(raw).await?;
        let now = Utc::now();
        session.ensure_active(now)?;

        let from = session.status;
        session.transition(SessionStatus::Abandoned, now)?;
        let entry = history_entry(
            &session,
            HistoryAction::Abandonment,
            "Session abandoned by the client",
            json!({ "from": from }),
            ctx.ip_address.as_deref(),
            now,
        );
        self.commit(&mut session, ChangeSet::new().record(entry))
            .await?;

        info!(%from, "Session abandoned");
        Ok(session)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn get_session(&self, raw: &str) -> Result<SessionDetail, AppError> {
        let session = self.load(&parse_token(raw)?).await?;
        let history = self.repo.session_history(session.id).await?;
        Ok(SessionDetail { session, history })
    }

    pub async fn is_active(&self, raw: &str) -> Result<bool, AppError> {
        let session = self.load(&parse_token(raw)?).await?;
        Ok(session.is_active(Utc::now()))
    }

    /// End-of-journey recap with a localized thank-you message.
    #[instrument(skip(self), fields(session = %raw))]
    pub async fn summarize(&self, raw: &str, locale: Locale) -> Result<SessionSummary, AppError> {
        let session = self.load(&parse_token(raw)?).await?;

        let client = match session.client_id {
            Some(id) => self.repo.get_client(id).await?,
            None => None,
        };
        let service = match session.service_id {
            Some(id) => self.repo.get_service(id).await?,
            None => None,
        };
        let payment = match session.data.payment_id {
            Some(id) => self.repo.get_payment(id).await?,
            None => self.repo.list_session_payments(session.id).await?.pop(),
        };

        let message =
            thank_you_message(locale, client.as_ref(), service.as_ref(), session.status);

        Ok(SessionSummary {
            session_id: session.token.clone(),
            status: session.status,
            step: session.step(),
            amount: session.amount,
            client: client.as_ref().map(ClientResponse::from),
            service: service.as_ref().map(ServiceResponse::from),
            payment: payment.as_ref().map(PaymentResponse::from),
            completed_at: session.payment_completed_at,
            message,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, AppError> {
        self.repo
            .list_services(active_only)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_service(&self, req: NewService) -> Result<Service, AppError> {
        let service = Service::new(req, Utc::now())?;
        self.repo.create_service(&service).await?;
        info!(service_id = %service.id, "Service created");
        Ok(service)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment administration
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn payment_detail(&self, id: PaymentId) -> Result<PaymentDetail, AppError> {
        let payment = self
            .repo
            .get_payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {id}")))?;
        let session = self
            .repo
            .get_session(payment.session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {}", payment.session_id)))?;
        let external_transactions = self.repo.list_external_transactions(id).await?;

        Ok(PaymentDetail {
            payment,
            session_token: session.token,
            external_transactions,
        })
    }

    /// Deletes a payment nobody references. Payments that reached a provider
    /// must be cancelled instead.
    #[instrument(skip(self))]
    pub async fn delete_payment(&self, id: PaymentId) -> Result<(), AppError> {
        self.repo.delete_payment(id).await.map_err(|e| match e {
            RepoError::NotFound => AppError::NotFound(format!("Payment {id}")),
            other => other.into(),
        })?;
        info!("Payment deleted");
        Ok(())
    }

    pub fn reload_providers(&self) -> Vec<String> {
        self.gateway.reload_all()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────────────

    /// Moves up to `limit` overdue sessions to `expired`.
    pub async fn expire_stale_sessions(&self, limit: i64) -> Result<usize, AppError> {
        self.expire_stale_sessions_at(Utc::now(), limit).await
    }

    #[instrument(skip(self))]
    pub async fn expire_stale_sessions_at(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, AppError> {
        let stale = self.repo.list_stale_sessions(now, limit).await?;
        let mut expired = 0;

        for candidate in stale {
            let _guard = self.locks.acquire(candidate.id).await;
            let Some(mut session) = self.repo.get_session(candidate.id).await? else {
                continue;
            };
            if session.status.is_terminal() || !session.is_expired(now) {
                continue;
            }

            let from = session.status;
            session.transition(SessionStatus::Expired, now)?;
            let entry = history_entry(
                &session,
                HistoryAction::Expiration,
                "Session expired",
                json!({ "from": from, "expires_at": session.effective_expiry() }),
                None,
                now,
            );
            match self.commit(&mut session, ChangeSet::new().record(entry)).await {
                Ok(()) => expired += 1,
                Err(AppError::Conflict(e)) => {
                    warn!(session = %session.token, error = %e, "Session changed while expiring, skipped");
                }
                Err(e) => return Err(e),
            }
        }

        let pruned = self.locks.prune();
        if expired > 0 {
            info!(expired, pruned, "Stale sessions expired");
        }
        Ok(expired)
    }
}
