//! Configuration loading from environment.

use std::env;
use std::time::Duration;

use salon_types::SettlementPolicy;

const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;
const DEFAULT_EXPIRY_SWEEP_SECONDS: u64 = 300;

/// Log output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration.
///
/// Provider credentials are not part of it: the CinetPay adapter reads its
/// own variables so they can be reloaded without a restart.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_api_key: Option<String>,
    pub rate_limit_per_minute: u32,
    pub settlement: SettlementPolicy,
    pub expiry_sweep_interval: Duration,
    pub log_format: LogFormat,
    pub otel_enabled: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()?;

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let rate_limit_per_minute = match var("RATE_LIMIT_PER_MINUTE") {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_MINUTE must be a positive integer"))?,
            None => DEFAULT_RATE_LIMIT_PER_MINUTE,
        };

        let settlement = match var("SETTLEMENT_ROUTES") {
            Some(raw) => SettlementPolicy::parse(&raw)?,
            None => SettlementPolicy::default(),
        };

        let sweep_seconds = match var("EXPIRY_SWEEP_SECONDS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("EXPIRY_SWEEP_SECONDS must be a number of seconds"))?,
            None => DEFAULT_EXPIRY_SWEEP_SECONDS,
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let otel_enabled = var("OTEL_ENABLED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            port,
            database_url,
            admin_api_key: var("ADMIN_API_KEY"),
            rate_limit_per_minute,
            settlement,
            expiry_sweep_interval: Duration::from_secs(sweep_seconds.max(1)),
            log_format,
            otel_enabled,
        })
    }
}
