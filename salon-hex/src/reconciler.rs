//! Provider notification reconciliation.
//!
//! Callbacks, admin status refreshes and admin cancellations all funnel into
//! [`SessionService::reconcile`], which moves a payment (and its session)
//! forward under the session lock. Reconciliation is idempotent: replaying
//! the same provider report writes nothing.

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use salon_types::ports::ProviderStatusResult;
use salon_types::{
    AppError, ChangeSet, ExternalTransaction, HistoryAction, PaymentCorrelation, PaymentId,
    PaymentRecord, PaymentStatus, SalonRepository, SessionStatus,
};

use crate::service::{PaymentDetail, SessionService, history_entry};

/// What a provider told us about one of its transactions.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub provider: String,
    pub provider_transaction_id: String,
    /// Callback vocabulary (`completed`, `failed`, `cancelled`, ...).
    pub status: String,
    /// Verbatim provider status, stored on the external transaction.
    pub provider_status: String,
    pub raw: serde_json::Value,
}

impl StatusReport {
    fn from_check(provider: &str, checked: ProviderStatusResult) -> Self {
        Self {
            provider: provider.to_string(),
            provider_transaction_id: checked.provider_transaction_id,
            status: checked.status,
            provider_status: checked.provider_status,
            raw: checked.raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The payment (and possibly its session) moved.
    Processed {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// Nothing new: a redelivery or an out-of-order status.
    Duplicate { payment_id: PaymentId },
    /// Unparseable or unauthenticated notification. Nothing was touched.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: PaymentRecord,
    pub session_status: SessionStatus,
    /// True when the payment status changed.
    pub changed: bool,
}

impl<R: SalonRepository> SessionService<R> {
    /// Handles an inbound provider notification.
    #[instrument(skip(self, body, signature, ip_address), fields(provider = %provider))]
    pub async fn handle_callback(
        &self,
        provider: &str,
        body: &[u8],
        signature: Option<&str>,
        ip_address: Option<String>,
    ) -> Result<CallbackOutcome, AppError> {
        let provider = self.gateway.provider(provider)?;

        let callback = match provider.parse_callback(body, signature) {
            Ok(callback) => callback,
            Err(e) => {
                warn!(error = %e, "Rejected unparseable callback");
                return Ok(CallbackOutcome::Rejected);
            }
        };
        if !provider.verify_callback(&callback) {
            warn!(
                transaction = %callback.provider_transaction_id,
                "Rejected callback with invalid signature"
            );
            return Ok(CallbackOutcome::Rejected);
        }

        let (report, correlation) = match &callback.status {
            Some(status) => {
                let provider_status = callback
                    .payload
                    .get("status")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(status)
                    .to_string();
                let report = StatusReport {
                    provider: provider.name().to_string(),
                    provider_transaction_id: callback.provider_transaction_id.clone(),
                    status: status.clone(),
                    provider_status,
                    raw: callback.payload.clone(),
                };
                (report, callback.correlation.clone())
            }
            None => {
                let checked = provider
                    .check_status(&callback.provider_transaction_id)
                    .await?;
                let correlation = callback.correlation.clone().or(checked.correlation.clone());
                (StatusReport::from_check(provider.name(), checked), correlation)
            }
        };

        let payment = self.resolve_payment(correlation.as_ref(), &report).await?;
        let target = PaymentStatus::from_callback_status(&report.status);
        let outcome = self
            .reconcile(payment.id, target, Some(report), ip_address)
            .await?;

        Ok(if outcome.changed {
            CallbackOutcome::Processed {
                payment_id: outcome.payment.id,
                status: outcome.payment.status,
            }
        } else {
            CallbackOutcome::Duplicate {
                payment_id: outcome.payment.id,
            }
        })
    }

    /// Correlation metadata first, then the provider's transaction id.
    async fn resolve_payment(
        &self,
        correlation: Option<&PaymentCorrelation>,
        report: &StatusReport,
    ) -> Result<PaymentRecord, AppError> {
        if let Some(correlation) = correlation {
            if let Some(payment) = self.repo.get_payment(correlation.payment_id).await? {
                return Ok(payment);
            }
        }
        self.repo
            .find_payment_by_external(&report.provider, &report.provider_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No payment matches {} transaction {}",
                    report.provider, report.provider_transaction_id
                ))
            })
    }

    /// Applies `target` to the payment, recording `report` on its external
    /// transaction.
    ///
    /// Backward or post-final moves are ignored. Once the payment is final
    /// its external transaction is frozen too, so late reports only reach
    /// the logs. The session follows only while it waits on this very
    /// payment.
    #[instrument(skip(self, report, ip_address))]
    pub async fn reconcile(
        &self,
        payment_id: PaymentId,
        target: PaymentStatus,
        report: Option<StatusReport>,
        ip_address: Option<String>,
    ) -> Result<Reconciliation, AppError> {
        let session_id = self
            .repo
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {payment_id}")))?
            .session_id;

        let _guard = self.locks.acquire(session_id).await;
        let mut payment = self
            .repo
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {payment_id}")))?;
        let mut session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {session_id}")))?;
        let now = Utc::now();
        let mut changes = ChangeSet::new();

        if let Some(report) = &report {
            match self
                .repo
                .find_external_transaction(payment.id, &report.provider)
                .await?
            {
                Some(mut external) => {
                    let differs = external.provider_status != report.provider_status
                        || external.raw_response != report.raw
                        || external.provider_transaction_id != report.provider_transaction_id;
                    if differs && payment.status.is_final() {
                        // The external row keeps the report that settled the payment
                        warn!(
                            payment_status = %payment.status,
                            settled_with = %external.provider_status,
                            reported = %report.provider_status,
                            "Ignoring late provider report for a settled payment"
                        );
                    } else if differs {
                        external.provider_transaction_id = report.provider_transaction_id.clone();
                        external.record_update(&report.provider_status, report.raw.clone(), now);
                        changes = changes.update_external(external);
                    }
                }
                None => {
                    let mut external = ExternalTransaction::initiated(
                        payment.id,
                        report.provider.as_str(),
                        report.provider_transaction_id.as_str(),
                        report.raw.clone(),
                        now,
                    );
                    external.provider_status = report.provider_status.clone();
                    changes = changes.insert_external(external);
                }
            }
        }

        let before = payment.status;
        let changed = before != target && before.can_transition_to(target);
        if changed {
            payment.advance(target, now)?;
            if let Some(report) = &report {
                payment
                    .external_reference
                    .get_or_insert_with(|| report.provider_transaction_id.clone());
            }
            changes = changes.update_payment(payment.clone(), before);
        } else if before != target {
            info!(from = %before, to = %target, "Ignoring out-of-order payment status");
        }

        let waits_on_payment = session.status == SessionStatus::PaymentInitiated
            && session.data.payment_id.is_none_or(|id| id == payment.id);
        let session_move = match target {
            PaymentStatus::Succeeded => Some((
                SessionStatus::PaymentSucceeded,
                HistoryAction::PaymentConfirmation,
                format!("Payment {} confirmed", payment.reference_code),
            )),
            PaymentStatus::Failed | PaymentStatus::Cancelled => Some((
                SessionStatus::PaymentFailed,
                HistoryAction::PaymentFailure,
                format!("Payment {} {}", payment.reference_code, target),
            )),
            _ => None,
        };

        let mut session_changed = false;
        if let (true, true, Some((to, action, description))) = (changed, waits_on_payment, session_move) {
            session.transition(to, now)?;
            let entry = history_entry(
                &session,
                action,
                description,
                json!({
                    "payment_id": payment.id,
                    "status": payment.status,
                    "provider": report.as_ref().map(|r| r.provider.as_str()),
                    "provider_status": report.as_ref().map(|r| r.provider_status.as_str()),
                }),
                ip_address.as_deref(),
                now,
            );
            changes = changes.update_session(session.clone()).record(entry);
            session_changed = true;
        }

        if !changes.is_empty() {
            self.repo.apply(changes).await?;
        }
        if session_changed {
            session.version += 1;
        }

        if changed {
            info!(from = %before, to = %payment.status, session = %session.status, "Payment reconciled");
        }
        Ok(Reconciliation {
            payment,
            session_status: session.status,
            changed,
        })
    }

    /// Polls the provider for the payment's latest status and reconciles it.
    #[instrument(skip(self))]
    pub async fn refresh_payment(&self, id: PaymentId) -> Result<PaymentDetail, AppError> {
        let external = self
            .repo
            .list_external_transactions(id)
            .await?
            .pop()
            .ok_or_else(|| {
                AppError::Validation(format!("Payment {id} was never sent to a provider"))
            })?;

        let provider = self.gateway.provider(&external.provider)?;
        let checked = provider
            .check_status(&external.provider_transaction_id)
            .await?;
        let report = StatusReport::from_check(&external.provider, checked);
        let target = PaymentStatus::from_callback_status(&report.status);

        self.reconcile(id, target, Some(report), None).await?;
        self.payment_detail(id).await
    }

    /// Operator cancellation of a payment that has not settled.
    #[instrument(skip(self))]
    pub async fn cancel_payment(&self, id: PaymentId) -> Result<PaymentDetail, AppError> {
        let payment = self
            .repo
            .get_payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {id}")))?;
        if payment.status.is_final() && payment.status != PaymentStatus::Cancelled {
            return Err(AppError::Validation(format!(
                "Payment {} is already {}",
                payment.reference_code, payment.status
            )));
        }

        self.reconcile(id, PaymentStatus::Cancelled, None, None)
            .await?;
        self.payment_detail(id).await
    }
}
