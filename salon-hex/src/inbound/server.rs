//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use salon_types::SalonRepository;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::SessionService;
use crate::openapi::ApiDoc;

/// HTTP Server for the salon API.
pub struct HttpServer<R: SalonRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: SalonRepository> HttpServer<R> {
    /// Creates a server with the default public rate limit (100 req/min per
    /// IP) and the admin routes closed.
    pub fn new(service: Arc<SessionService<R>>) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                admin_key_hash: None,
            }),
            rate_limiter: Arc::new(RateLimiterState::default()),
        }
    }

    /// Opens the admin routes to bearers of `key`.
    pub fn with_admin_key(self, key: &str) -> Self {
        let state = Arc::new(AppState {
            service: self.state.service.clone(),
            admin_key_hash: Some(salon_repo::security::hash_api_key(key)),
        });
        Self { state, ..self }
    }

    pub fn with_rate_limit(self, requests_per_minute: u32) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
            ..self
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let public = Router::new()
            .route("/api/sessions", post(handlers::start_session::<R>))
            .route("/api/sessions/direct-auth", post(handlers::direct_auth::<R>))
            .route("/api/sessions/{token}", get(handlers::get_session::<R>))
            .route(
                "/api/sessions/{token}/identify",
                post(handlers::identify_client::<R>),
            )
            .route(
                "/api/sessions/{token}/service",
                post(handlers::select_service::<R>),
            )
            .route(
                "/api/sessions/{token}/payment",
                post(handlers::initiate_payment::<R>),
            )
            .route("/api/sessions/{token}/abandon", post(handlers::abandon::<R>))
            .route("/api/sessions/{token}/summary", get(handlers::summary::<R>))
            .route("/api/services", get(handlers::list_services::<R>))
            .route_layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ));

        let admin = Router::new()
            .route("/api/admin/services", post(handlers::create_service::<R>))
            .route(
                "/api/admin/payments/{id}",
                get(handlers::payment_detail::<R>).delete(handlers::delete_payment::<R>),
            )
            .route(
                "/api/admin/payments/{id}/refresh",
                post(handlers::refresh_payment::<R>),
            )
            .route(
                "/api/admin/payments/{id}/cancel",
                post(handlers::cancel_payment::<R>),
            )
            .route(
                "/api/admin/sessions/expire",
                post(handlers::expire_sessions::<R>),
            )
            .route(
                "/api/admin/providers/reload",
                post(handlers::reload_providers::<R>),
            )
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ));

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/webhooks/{provider}",
                post(handlers::provider_webhook::<R>),
            )
            .merge(public)
            .merge(admin)
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
