//! Salon CLI
//!
//! Command-line interface for the salon payment-session API.

use anyhow::Result;
use clap::{Parser, Subcommand};

use salon_client::SalonClient;
use salon_types::{
    Gender, MobileOperator, NewClient, NewService, PaymentId, PaymentMethod, ServiceCategory,
    ServiceId,
};

#[derive(Parser)]
#[command(name = "salon")]
#[command(author, version, about = "Salon payment-session API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the salon API
    #[arg(long, env = "SALON_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Admin API key for the admin routes
    #[arg(long, env = "SALON_ADMIN_KEY")]
    admin_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Client journey operations
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },
    /// Service catalog
    Service {
        #[command(subcommand)]
        action: ServiceCommands,
    },
    /// Payment administration
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Expire overdue sessions now
    Expire,
    /// Reload payment provider settings
    ReloadProviders,
    /// Check API health
    Health,
}

/// Client details used to register an unknown phone number.
#[derive(clap::Args)]
struct ClientArgs {
    #[arg(long, requires = "first_name")]
    last_name: Option<String>,
    #[arg(long, requires = "last_name")]
    first_name: Option<String>,
    /// male, female or other
    #[arg(long)]
    gender: Option<Gender>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    neighborhood: Option<String>,
}

impl ClientArgs {
    fn into_new_client(self) -> Option<NewClient> {
        Some(NewClient {
            last_name: self.last_name?,
            first_name: self.first_name?,
            gender: self.gender,
            email: self.email,
            neighborhood: self.neighborhood,
        })
    }
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Open a session as if a QR code had been scanned
    Start {
        /// Session token to use instead of a generated one
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        device: Option<String>,
    },
    /// Open (or resume) a session and identify the client in one step
    DirectAuth {
        #[arg(long)]
        phone: String,
        /// Existing session token to resume
        #[arg(long)]
        token: Option<String>,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Show a session with its history
    Get { token: String },
    /// Identify the client by phone number
    Identify {
        token: String,
        #[arg(long)]
        phone: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Select the service and amount
    Select {
        token: String,
        /// Service ID (UUID)
        #[arg(long)]
        service: ServiceId,
        /// Agreed amount in FCFA, required for price bands
        #[arg(long)]
        amount: Option<i64>,
    },
    /// Initiate the payment
    Pay {
        token: String,
        /// mobile_money, card, prepaid_card or cash
        #[arg(long)]
        method: PaymentMethod,
        /// wave, orange, mtn or moov
        #[arg(long)]
        operator: Option<MobileOperator>,
    },
    /// Abandon the session
    Abandon { token: String },
    /// Show the end-of-journey summary
    Summary {
        token: String,
        /// fr or en
        #[arg(long)]
        lang: Option<String>,
    },
}

#[derive(Subcommand)]
enum ServiceCommands {
    /// List active services
    List,
    /// Register a service
    Create {
        #[arg(long)]
        name: String,
        /// dreadlocks, sister_locks, shampoo, ...
        #[arg(long)]
        category: ServiceCategory,
        #[arg(long)]
        price_min: i64,
        /// Upper bound of the price band; omit for a fixed price
        #[arg(long)]
        price_max: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        minutes: Option<i32>,
    },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Show a payment with its provider records
    Get { id: PaymentId },
    /// Poll the provider and reconcile
    Refresh { id: PaymentId },
    /// Cancel a payment that has not settled
    Cancel { id: PaymentId },
    /// Delete a payment without provider records
    Delete { id: PaymentId },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = SalonClient::new(&cli.api_url);
    if let Some(key) = cli.admin_key {
        client = client.with_admin_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Session { action } => match action {
            SessionCommands::Start { token, device } => {
                print_json(&client.start_session(token, device).await?)?;
            }
            SessionCommands::DirectAuth {
                phone,
                token,
                client: details,
            } => {
                let auth = client
                    .direct_auth(&phone, details.into_new_client(), token)
                    .await?;
                print_json(&auth)?;
            }
            SessionCommands::Get { token } => {
                print_json(&client.get_session(&token).await?)?;
            }
            SessionCommands::Identify {
                token,
                phone,
                client: details,
            } => {
                let identified = client
                    .identify_client(&token, &phone, details.into_new_client())
                    .await?;
                print_json(&identified)?;
            }
            SessionCommands::Select {
                token,
                service,
                amount,
            } => {
                print_json(&client.select_service(&token, service, amount).await?)?;
            }
            SessionCommands::Pay {
                token,
                method,
                operator,
            } => {
                let initiation = client.initiate_payment(&token, method, operator).await?;
                println!("{}", initiation.message);
                if let Some(url) = &initiation.redirect_url {
                    println!("Checkout: {url}");
                }
                print_json(&initiation)?;
            }
            SessionCommands::Abandon { token } => {
                print_json(&client.abandon(&token).await?)?;
            }
            SessionCommands::Summary { token, lang } => {
                let summary = client.summary(&token, lang.as_deref()).await?;
                println!("{}", summary.message);
                print_json(&summary)?;
            }
        },

        Commands::Service { action } => match action {
            ServiceCommands::List => {
                print_json(&client.list_services().await?)?;
            }
            ServiceCommands::Create {
                name,
                category,
                price_min,
                price_max,
                description,
                minutes,
            } => {
                let service = NewService {
                    name,
                    category,
                    description,
                    price_min,
                    price_max,
                    estimated_minutes: minutes,
                };
                print_json(&client.create_service(&service).await?)?;
            }
        },

        Commands::Payment { action } => match action {
            PaymentCommands::Get { id } => {
                print_json(&client.payment_detail(id).await?)?;
            }
            PaymentCommands::Refresh { id } => {
                print_json(&client.refresh_payment(id).await?)?;
            }
            PaymentCommands::Cancel { id } => {
                print_json(&client.cancel_payment(id).await?)?;
            }
            PaymentCommands::Delete { id } => {
                client.delete_payment(id).await?;
                println!("✓ Payment deleted");
            }
        },

        Commands::Expire => {
            let expired = client.expire_sessions().await?;
            println!("✓ {} session(s) expired", expired.expired);
        }

        Commands::ReloadProviders => {
            let reloaded = client.reload_providers().await?;
            println!("✓ Reloaded: {}", reloaded.reloaded.join(", "));
        }
    }

    Ok(())
}
