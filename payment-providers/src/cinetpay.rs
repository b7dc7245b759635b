//! CinetPay checkout v2 adapter.
//!
//! Initiation posts to `/v2/payment` and expects code `"201"` with a
//! `payment_url`. Status checks post to `/v2/payment/check`, where code `"00"`
//! means the payment went through. Notifications carry `cpm_site_id` and
//! `cpm_trans_id`; the site id must match ours and, when the request carries
//! an `x-token` header, it must be the HMAC-SHA256 of the raw body keyed with
//! the secret key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use salon_types::ports::{
    InitiationRequest, PaymentProvider, ProviderCallback, ProviderInitiation,
    ProviderStatusResult,
};
use salon_types::{GatewayError, PaymentCorrelation, PaymentMethod};

use crate::settings::SettingsHandle;
use crate::signature;

pub const PROVIDER_NAME: &str = "cinetpay";

const TEST_BASE_URL: &str = "https://api-checkout.cinetpay.com";
const PROD_BASE_URL: &str = "https://api.cinetpay.com";
const INITIATED_CODE: &str = "201";
const SUCCESS_CODE: &str = "00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CinetPayMode {
    Test,
    Prod,
}

impl std::str::FromStr for CinetPayMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(CinetPayMode::Test),
            "prod" | "production" => Ok(CinetPayMode::Prod),
            other => Err(GatewayError::NotConfigured(format!(
                "{PROVIDER_NAME} (unknown mode '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CinetPaySettings {
    pub site_id: String,
    pub api_key: String,
    /// Key for `x-token` notification signatures.
    pub secret_key: Option<String>,
    pub mode: CinetPayMode,
    pub currency: String,
    pub lang: String,
    /// Public origin of this service, used for notify/return/cancel URLs.
    pub public_base_url: String,
    /// Overrides the mode's API origin (sandboxes, tests).
    pub api_base_url: Option<String>,
    /// Reject notifications that carry no signature.
    pub require_signature: bool,
    pub timeout: Duration,
}

impl Default for CinetPaySettings {
    fn default() -> Self {
        Self {
            site_id: String::new(),
            api_key: String::new(),
            secret_key: None,
            mode: CinetPayMode::Test,
            currency: "XOF".into(),
            lang: "fr".into(),
            public_base_url: "http://localhost:3000".into(),
            api_base_url: None,
            require_signature: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CinetPaySettings {
    /// Reads `CINETPAY_*` and `PUBLIC_BASE_URL` from the environment.
    ///
    /// Missing credentials are allowed; the provider then answers
    /// [`GatewayError::NotConfigured`] until a reload supplies them.
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mode = match var("CINETPAY_MODE") {
            Some(m) => m.parse()?,
            None => defaults.mode,
        };

        Ok(Self {
            site_id: var("CINETPAY_SITE_ID").unwrap_or_default(),
            api_key: var("CINETPAY_API_KEY").unwrap_or_default(),
            secret_key: var("CINETPAY_SECRET_KEY"),
            mode,
            currency: var("CINETPAY_CURRENCY").unwrap_or(defaults.currency),
            lang: var("CINETPAY_LANG").unwrap_or(defaults.lang),
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            api_base_url: var("CINETPAY_BASE_URL"),
            require_signature: var("CINETPAY_REQUIRE_SIGNATURE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            timeout: defaults.timeout,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.site_id.is_empty() && !self.api_key.is_empty()
    }

    fn api_base(&self) -> &str {
        let base = match (&self.api_base_url, self.mode) {
            (Some(url), _) => url.as_str(),
            (None, CinetPayMode::Test) => TEST_BASE_URL,
            (None, CinetPayMode::Prod) => PROD_BASE_URL,
        };
        base.trim_end_matches('/')
    }

    pub fn payment_url(&self) -> String {
        format!("{}/v2/payment", self.api_base())
    }

    pub fn check_url(&self) -> String {
        format!("{}/v2/payment/check", self.api_base())
    }

    pub fn notify_url(&self) -> String {
        format!(
            "{}/api/webhooks/{PROVIDER_NAME}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn return_url(&self, session: &str) -> String {
        format!(
            "{}/session/{session}/confirmation",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn cancel_url(&self, session: &str) -> String {
        format!(
            "{}/session/{session}/cancel",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// CinetPay channel for a payment method.
fn channel_for(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::MobileMoney => "MOBILE_MONEY",
        PaymentMethod::Card | PaymentMethod::PrepaidCard => "CARD",
        PaymentMethod::Cash => "ALL",
    }
}

/// Maps CinetPay's transaction status onto the callback vocabulary.
pub fn normalize_status(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ACCEPTED" | "COMPLETED" | "SUCCESS" => "completed".into(),
        "REFUSED" | "FAILED" => "failed".into(),
        "CANCELED" | "CANCELLED" => "cancelled".into(),
        _ => raw.trim().to_ascii_lowercase(),
    }
}

/// CinetPay sends codes sometimes as strings, sometimes as numbers.
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct CinetPayProvider {
    settings: Arc<SettingsHandle<CinetPaySettings>>,
    client: reqwest::Client,
}

impl CinetPayProvider {
    pub fn new(settings: Arc<SettingsHandle<CinetPaySettings>>) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    pub fn settings(&self) -> Arc<CinetPaySettings> {
        self.settings.snapshot()
    }

    async fn post_json(
        &self,
        settings: &CinetPaySettings,
        url: &str,
        body: &Value,
    ) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(url)
            .timeout(settings.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "CinetPay returned an HTTP error");
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    fn ensure_configured(settings: &CinetPaySettings) -> Result<(), GatewayError> {
        if settings.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::NotConfigured(PROVIDER_NAME.into()))
        }
    }
}

#[async_trait]
impl PaymentProvider for CinetPayProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, amount = request.amount))]
    async fn initiate(
        &self,
        request: &InitiationRequest,
    ) -> Result<ProviderInitiation, GatewayError> {
        let settings = self.settings.snapshot();
        Self::ensure_configured(&settings)?;

        let session = request.correlation.session_id.as_str();
        let payload = json!({
            "apikey": settings.api_key,
            "site_id": settings.site_id,
            "transaction_id": request.transaction_id,
            "amount": request.amount,
            "currency": settings.currency,
            "description": request.description,
            "customer_id": request.customer.id,
            "customer_name": request.customer.last_name,
            "customer_surname": request.customer.first_name,
            "customer_email": request.customer.email.clone().unwrap_or_default(),
            "customer_phone_number": request.customer.phone,
            "customer_address": "",
            "customer_city": "",
            "customer_country": "CI",
            "notify_url": settings.notify_url(),
            "return_url": settings.return_url(session),
            "cancel_url": settings.cancel_url(session),
            "metadata": request.correlation.encode(),
            "channels": channel_for(request.method),
            "lang": settings.lang,
        });

        let body = self
            .post_json(&settings, &settings.payment_url(), &payload)
            .await?;

        let code = string_field(&body, "code").unwrap_or_default();
        if code != INITIATED_CODE {
            let message = string_field(&body, "description")
                .or_else(|| string_field(&body, "message"))
                .unwrap_or_else(|| "Unknown CinetPay error".into());
            warn!(%code, %message, "CinetPay refused the payment initiation");
            return Err(GatewayError::Provider { code, message });
        }

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let redirect_url = string_field(&data, "payment_url").ok_or_else(|| {
            GatewayError::InvalidResponse("missing data.payment_url in CinetPay response".into())
        })?;

        info!("CinetPay checkout opened");
        Ok(ProviderInitiation {
            provider_transaction_id: request.transaction_id.clone(),
            redirect_url,
            payment_token: string_field(&data, "payment_token"),
            raw: body,
        })
    }

    #[instrument(skip(self))]
    async fn check_status(
        &self,
        provider_transaction_id: &str,
    ) -> Result<ProviderStatusResult, GatewayError> {
        let settings = self.settings.snapshot();
        Self::ensure_configured(&settings)?;

        let payload = json!({
            "apikey": settings.api_key,
            "site_id": settings.site_id,
            "transaction_id": provider_transaction_id,
        });
        let body = self
            .post_json(&settings, &settings.check_url(), &payload)
            .await?;

        let code = string_field(&body, "code").unwrap_or_default();
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let provider_status = string_field(&data, "status").unwrap_or_else(|| code.clone());
        let status = if code == SUCCESS_CODE {
            "completed".to_string()
        } else {
            match string_field(&data, "status") {
                Some(s) => normalize_status(&s),
                None => "pending".to_string(),
            }
        };
        let correlation = data
            .get("metadata")
            .and_then(PaymentCorrelation::decode);

        Ok(ProviderStatusResult {
            provider_transaction_id: provider_transaction_id.to_string(),
            status,
            provider_status,
            correlation,
            raw: body,
        })
    }

    fn parse_callback(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ProviderCallback, GatewayError> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("callback is not JSON: {e}")))?;
        if !payload.is_object() {
            return Err(GatewayError::InvalidResponse(
                "callback body must be a JSON object".into(),
            ));
        }

        let provider_transaction_id = string_field(&payload, "cpm_trans_id")
            .or_else(|| string_field(&payload, "transaction_id"))
            .ok_or_else(|| GatewayError::InvalidResponse("callback without cpm_trans_id".into()))?;

        Ok(ProviderCallback {
            site_id: string_field(&payload, "cpm_site_id")
                .or_else(|| string_field(&payload, "site_id")),
            provider_transaction_id,
            // An unsigned body status is never trusted; the reconciler asks
            // CinetPay instead.
            status: signature
                .and_then(|_| string_field(&payload, "status"))
                .map(|s| normalize_status(&s)),
            correlation: payload.get("metadata").and_then(PaymentCorrelation::decode),
            signature: signature.map(str::to_string),
            raw_body: body.to_vec(),
            payload,
        })
    }

    fn verify_callback(&self, callback: &ProviderCallback) -> bool {
        let settings = self.settings.snapshot();
        if settings.site_id.is_empty() {
            warn!("CinetPay callback received while no site id is configured");
            return false;
        }
        if callback.site_id.as_deref() != Some(settings.site_id.as_str()) {
            warn!(site_id = ?callback.site_id, "CinetPay callback for a foreign site id");
            return false;
        }
        match (&callback.signature, &settings.secret_key) {
            (Some(sig), Some(secret)) => {
                let ok = signature::verify(&callback.raw_body, sig, secret);
                if !ok {
                    warn!("CinetPay callback signature mismatch");
                }
                ok
            }
            (Some(_), None) => {
                warn!("CinetPay callback is signed but no secret key is configured");
                false
            }
            (None, _) if settings.require_signature => {
                warn!("Unsigned CinetPay callback rejected");
                false
            }
            (None, _) => true,
        }
    }

    fn reload(&self) -> Result<(), GatewayError> {
        let fresh = self.settings.reload()?;
        info!(mode = ?fresh.mode, configured = fresh.is_configured(), "CinetPay settings reloaded");
        Ok(())
    }
}
