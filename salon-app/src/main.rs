//! # Salon Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Register the payment providers behind the settlement policy
//! - Create the session service and its expiry worker
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_providers::{CinetPayProvider, CinetPaySettings, PayDunyaProvider, SettingsHandle};
use salon_hex::{ExpiryWorker, PaymentGateway, SessionService, inbound::HttpServer};
use salon_repo::build_repo;

use config::{Config, LogFormat};

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("salon-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize OpenTelemetry tracing when an OTLP collector is expected
    let (telemetry, otel_provider) = if config.otel_enabled {
        let (otel_tracer, otel_provider) = init_tracer()?;
        (
            Some(tracing_opentelemetry::layer().with_tracer(otel_tracer)),
            Some(otel_provider),
        )
    } else {
        (None, None)
    };

    // Initialize tracing subscriber
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,salon_app=debug,salon_hex=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .with(telemetry)
        .init();

    tracing::info!("Starting salon server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    // Providers read their own credentials so an admin reload picks up changes
    let cinetpay_settings = Arc::new(SettingsHandle::with_loader(CinetPaySettings::from_env)?);
    if !cinetpay_settings.snapshot().is_configured() {
        tracing::warn!("CinetPay credentials missing; mobile money payments will be refused");
    }
    let gateway = PaymentGateway::new(config.settlement.clone())
        .with_provider(Arc::new(CinetPayProvider::new(cinetpay_settings)))
        .with_provider(Arc::new(PayDunyaProvider::new()));

    // Create the session service
    let service = Arc::new(SessionService::new(repo, gateway));

    tokio::spawn(ExpiryWorker::new(service.clone(), config.expiry_sweep_interval).run());

    // Create and run the HTTP server
    let mut server = HttpServer::new(service).with_rate_limit(config.rate_limit_per_minute);
    match &config.admin_api_key {
        Some(key) => server = server.with_admin_key(key),
        None => tracing::warn!("ADMIN_API_KEY not set; admin routes are disabled"),
    }
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    if let Some(provider) = otel_provider {
        let _ = provider.shutdown();
    }
    Ok(())
}
