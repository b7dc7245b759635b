//! Client example walking a salon visit end to end against a running server.
//!
//! Run with: cargo run -p salon-app --example client_example --no-default-features --features sqlite

use std::net::SocketAddr;
use std::sync::Arc;

use salon_client::SalonClient;
use salon_hex::{PaymentGateway, SessionService, inbound::HttpServer};
use salon_repo::build_repo;
use salon_types::{NewClient, NewService, PaymentMethod, ServiceCategory, SettlementPolicy};
use tempfile::tempdir;
use tokio::net::TcpListener;

const ADMIN_KEY: &str = "sk_admin_example";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let port = addr.port();
    drop(listener);

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("salon.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on port {port}...");
    println!("   Database: {db_url}");

    // Build repository (handles connection and migration)
    let repo = build_repo(&db_url).await?;

    // No provider registered: cash and cards settle at the counter
    let gateway = PaymentGateway::new(SettlementPolicy::default());
    let service = Arc::new(SessionService::new(repo, gateway));
    let server = HttpServer::new(service).with_admin_key(ADMIN_KEY);

    let server_addr = format!("127.0.0.1:{port}");
    tokio::spawn(async move {
        if let Err(e) = server.run(&server_addr).await {
            eprintln!("server stopped: {e}");
        }
    });

    // Wait for server to start
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let client = SalonClient::new(format!("http://127.0.0.1:{port}"));

    // ─────────────────────────────────────────────────────────────────────────
    // Demo: a cash visit
    // ─────────────────────────────────────────────────────────────────────────

    let health = client.health().await?;
    println!("✅ Server health: {health}");

    let new_service = NewService {
        name: "Sister locks complet".into(),
        category: ServiceCategory::SisterLocks,
        description: None,
        price_min: 5000,
        price_max: Some(10000),
        estimated_minutes: Some(240),
    };

    let refused = client.create_service(&new_service).await;
    if let Err(e) = &refused {
        println!("✅ Admin route refused without key: {e}");
    }

    let admin = SalonClient::new(format!("http://127.0.0.1:{port}")).with_admin_key(ADMIN_KEY);
    let service = admin.create_service(&new_service).await?;
    println!("✅ Created service: {} ({})", service.name, service.display_price);

    let session = client.start_session(None, Some("kiosk".into())).await?;
    let token = session.session_id.to_string();
    println!("✅ Session opened: {token} (step {})", session.step);

    let identified = client
        .identify_client(
            &token,
            "+2250700000000",
            Some(NewClient {
                last_name: "Koné".into(),
                first_name: "Awa".into(),
                ..Default::default()
            }),
        )
        .await?;
    println!(
        "✅ Client identified: {} (new: {})",
        identified.client.full_name, identified.created
    );

    let selected = client
        .select_service(&token, service.id, Some(7500))
        .await?;
    println!("✅ Service selected, amount {:?} FCFA", selected.amount);

    let payment = client
        .initiate_payment(&token, PaymentMethod::Cash, None)
        .await?;
    println!("✅ {} (payment={})", payment.message, payment.payment_id);

    let summary = client.summary(&token, Some("en")).await?;
    println!("\n💬 {}", summary.message);

    let detail = admin.payment_detail(payment.payment_id).await?;
    println!(
        "📋 Payment {} is {} ({})",
        detail.payment.reference_code, detail.payment.status, detail.payment.method_label
    );

    let session = client.get_session(&token).await?;
    println!("\n📜 History:");
    for entry in session.history {
        println!("   - {}: {}", entry.action, entry.description);
    }

    println!("\n🎉 Example completed successfully!");

    Ok(())
}
