//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use salon_types::domain::{NewPayment, PaymentCorrelation};
    use salon_types::ports::ChangeSet;
    use salon_types::{
        Client, ExternalTransaction, HistoryAction, MobileOperator, NewClient, NewService,
        PaymentMethod, PaymentRecord, PaymentSession, PaymentStatus, RepoError, RequestMetadata,
        SalonRepository, Service, ServiceCategory, SessionHistoryEntry, SessionStatus,
        SessionToken,
    };

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn client(phone: &str) -> Client {
        Client::new(
            phone,
            NewClient {
                last_name: "Koné".into(),
                first_name: "Awa".into(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn service(name: &str, active: bool) -> Service {
        let mut service = Service::new(
            NewService {
                name: name.into(),
                category: ServiceCategory::SisterLocks,
                description: None,
                price_min: 5000,
                price_max: Some(10000),
                estimated_minutes: Some(90),
            },
            Utc::now(),
        )
        .unwrap();
        service.active = active;
        service
    }

    fn history(session: &PaymentSession, action: HistoryAction) -> SessionHistoryEntry {
        SessionHistoryEntry::new(
            session.id,
            action,
            action.as_str(),
            json!({"status": session.status}),
            None,
            Utc::now(),
        )
    }

    /// Inserts a client, a service and a session that reached service selection.
    async fn seeded_session(repo: &SqliteRepo) -> (PaymentSession, Client, Service) {
        let now = Utc::now();
        let client = client("+2250700000000");
        let service = service("Sister locks", true);
        repo.create_client(&client).await.unwrap();
        repo.create_service(&service).await.unwrap();

        let mut session = PaymentSession::start(None, RequestMetadata::default(), now);
        session.identify(client.id, now).unwrap();
        session.select_service(service.id, 7500, now).unwrap();
        repo.apply(ChangeSet::new().insert_session(session.clone()))
            .await
            .unwrap();
        (session, client, service)
    }

    fn payment(session: &PaymentSession) -> PaymentRecord {
        PaymentRecord::new(
            NewPayment {
                session_id: session.id,
                client_id: session.client_id.unwrap(),
                service_id: session.service_id.unwrap(),
                amount: 7500,
                method: PaymentMethod::MobileMoney,
                operator: Some(MobileOperator::Wave),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_client() {
        let repo = setup_repo().await;
        let created = client("+2250700000000");
        repo.create_client(&created).await.unwrap();

        let by_phone = repo
            .find_client_by_phone("+2250700000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_phone.id, created.id);
        assert_eq!(by_phone.full_name(), "Awa Koné");

        let by_id = repo.get_client(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.phone, "+2250700000000");

        assert!(repo.find_client_by_phone("+2250711111111").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_phone_conflicts() {
        let repo = setup_repo().await;
        repo.create_client(&client("+2250700000000")).await.unwrap();

        let result = repo.create_client(&client("+2250700000000")).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_services_active_only() {
        let repo = setup_repo().await;
        repo.create_service(&service("Sister locks", true)).await.unwrap();
        repo.create_service(&service("Retired", false)).await.unwrap();

        assert_eq!(repo.list_services(true).await.unwrap().len(), 1);
        let all = repo.list_services(false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].price_band(), (5000, 10000));
    }

    #[tokio::test]
    async fn test_session_roundtrip_with_history() {
        let repo = setup_repo().await;
        let now = Utc::now();
        let token = SessionToken::parse("qr-stand-0001").unwrap();
        let session = PaymentSession::start(
            Some(token.clone()),
            RequestMetadata {
                user_agent: Some("Mozilla/5.0".into()),
                ip_address: Some("10.0.0.1".into()),
                device: Some("mobile".into()),
            },
            now,
        );

        repo.apply(
            ChangeSet::new()
                .insert_session(session.clone())
                .record(history(&session, HistoryAction::Scan)),
        )
        .await
        .unwrap();

        let stored = repo.find_session_by_token(&token).await.unwrap().unwrap();
        assert_eq!(stored.id, session.id);
        assert_eq!(stored.status, SessionStatus::Scanned);
        assert_eq!(stored.metadata.device.as_deref(), Some("mobile"));
        assert_eq!(stored.version, 0);
        assert!(stored.is_active(now));

        let entries = repo.session_history(session.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, HistoryAction::Scan);
    }

    #[tokio::test]
    async fn test_duplicate_token_conflicts() {
        let repo = setup_repo().await;
        let token = SessionToken::parse("qr-stand-0001").unwrap();
        let first = PaymentSession::start(Some(token.clone()), RequestMetadata::default(), Utc::now());
        let second = PaymentSession::start(Some(token), RequestMetadata::default(), Utc::now());

        repo.apply(ChangeSet::new().insert_session(first)).await.unwrap();
        let result = repo.apply(ChangeSet::new().insert_session(second)).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_session_update_bumps_version() {
        let repo = setup_repo().await;
        let (mut session, _, _) = seeded_session(&repo).await;

        session
            .transition(SessionStatus::PaymentInitiated, Utc::now())
            .unwrap();
        repo.apply(ChangeSet::new().update_session(session.clone()))
            .await
            .unwrap();

        let stored = repo.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::PaymentInitiated);
        assert_eq!(stored.version, 1);
        assert!(stored.payment_initiated_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_session_update_rolls_back_whole_change_set() {
        let repo = setup_repo().await;
        let (session, _, _) = seeded_session(&repo).await;

        let mut winner = session.clone();
        winner.transition(SessionStatus::Abandoned, Utc::now()).unwrap();
        repo.apply(ChangeSet::new().update_session(winner)).await.unwrap();

        let mut loser = session.clone();
        loser
            .transition(SessionStatus::PaymentInitiated, Utc::now())
            .unwrap();
        let result = repo
            .apply(
                ChangeSet::new()
                    .insert_payment(payment(&session))
                    .update_session(loser.clone())
                    .record(history(&loser, HistoryAction::PaymentInitiation)),
            )
            .await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));

        let stored = repo.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Abandoned);
        assert!(repo.list_session_payments(session.id).await.unwrap().is_empty());
        assert!(repo.session_history(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_lifecycle_with_external_transaction() {
        let repo = setup_repo().await;
        let (session, _, _) = seeded_session(&repo).await;
        let mut record = payment(&session);
        repo.apply(ChangeSet::new().insert_payment(record.clone()))
            .await
            .unwrap();

        let now = Utc::now();
        let correlation = PaymentCorrelation {
            session_id: session.token.clone(),
            payment_id: record.id,
            method: record.method,
        };
        let external = ExternalTransaction::initiated(
            record.id,
            "cinetpay",
            &record.reference_code,
            json!({"metadata": correlation.encode()}),
            now,
        );
        record.advance(PaymentStatus::InProgress, now).unwrap();
        repo.apply(
            ChangeSet::new()
                .update_payment(record.clone(), PaymentStatus::Pending)
                .insert_external(external.clone()),
        )
        .await
        .unwrap();

        let found = repo
            .find_payment_by_external("cinetpay", &record.reference_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.status, PaymentStatus::InProgress);

        let mut settled = external.clone();
        settled.record_update("ACCEPTED", json!({"code": "00"}), now);
        let mut succeeded = record.clone();
        succeeded.advance(PaymentStatus::Succeeded, now).unwrap();
        repo.apply(
            ChangeSet::new()
                .update_payment(succeeded, PaymentStatus::InProgress)
                .update_external(settled),
        )
        .await
        .unwrap();

        let stored = repo
            .find_external_transaction(record.id, "cinetpay")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provider_status, "ACCEPTED");
        assert_eq!(
            repo.get_payment(record.id).await.unwrap().unwrap().status,
            PaymentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_payment_update_guards_expected_status() {
        let repo = setup_repo().await;
        let (session, _, _) = seeded_session(&repo).await;
        let mut record = payment(&session);
        repo.apply(ChangeSet::new().insert_payment(record.clone()))
            .await
            .unwrap();

        record.advance(PaymentStatus::Failed, Utc::now()).unwrap();
        let result = repo
            .apply(ChangeSet::new().update_payment(record, PaymentStatus::InProgress))
            .await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_payment_blocked_by_external_transactions() {
        let repo = setup_repo().await;
        let (session, _, _) = seeded_session(&repo).await;

        let linked = payment(&session);
        let external =
            ExternalTransaction::initiated(linked.id, "cinetpay", "tx-1", json!({}), Utc::now());
        repo.apply(
            ChangeSet::new()
                .insert_payment(linked.clone())
                .insert_external(external),
        )
        .await
        .unwrap();

        let result = repo.delete_payment(linked.id).await;
        assert!(matches!(result, Err(RepoError::Constraint(_))));
        assert!(repo.get_payment(linked.id).await.unwrap().is_some());

        let free = payment(&session);
        repo.apply(ChangeSet::new().insert_payment(free.clone()))
            .await
            .unwrap();
        repo.delete_payment(free.id).await.unwrap();
        assert!(repo.get_payment(free.id).await.unwrap().is_none());

        assert!(matches!(
            repo.delete_payment(free.id).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_stale_sessions() {
        let repo = setup_repo().await;
        let now = Utc::now();

        let fresh = PaymentSession::start(None, RequestMetadata::default(), now);
        let stale = PaymentSession::start(None, RequestMetadata::default(), now - Duration::hours(25));
        let mut no_expiry = PaymentSession::start(None, RequestMetadata::default(), now - Duration::hours(30));
        no_expiry.expires_at = None;
        let mut finished =
            PaymentSession::start(None, RequestMetadata::default(), now - Duration::hours(30));
        finished.status = SessionStatus::Abandoned;

        for session in [&fresh, &stale, &no_expiry, &finished] {
            repo.apply(ChangeSet::new().insert_session(session.clone()))
                .await
                .unwrap();
        }

        let found = repo.list_stale_sessions(now, 10).await.unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&stale.id));
        assert!(ids.contains(&no_expiry.id));

        assert_eq!(repo.list_stale_sessions(now, 1).await.unwrap().len(), 1);
    }
}
