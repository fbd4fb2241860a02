//! Stripe hosted-checkout gateway client.
//!
//! The engine talks to the gateway through the [`PaymentGateway`] trait so
//! tests can substitute [`MockGateway`]. The production client drives
//! Stripe's Checkout Sessions API: a session is opened per payment with a
//! single line item priced in minor units, and settlement is read back from
//! the session's `payment_status`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::StripeConfig;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway not configured")]
    NotConfigured,

    #[error("gateway timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("gateway rejected the request: {code}: {message}")]
    Api { code: String, message: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("amount {0} cannot be represented in minor units")]
    InvalidAmount(Decimal),
}

/// Parameters for opening a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub amount: Decimal,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// An open hosted-checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub settled: bool,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn open_session(&self, request: &SessionRequest)
        -> Result<CheckoutSession, GatewayError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, GatewayError>;
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: Option<String>,
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else {
        GatewayError::Connection(err.to_string())
    }
}

/// Converts a 2-decimal amount to minor currency units (cents).
fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .ok_or(GatewayError::InvalidAmount(amount))
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    fn parse_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
        let parsed: StripeErrorBody = serde_json::from_str(body).unwrap_or_else(|_| StripeErrorBody {
            error: StripeErrorDetail {
                kind: status.as_str().to_string(),
                message: Some(body.to_string()),
            },
        });
        GatewayError::Api {
            code: parsed.error.kind,
            message: parsed.error.message.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn open_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let unit_amount = to_minor_units(request.amount)?;
        let params: Vec<(&str, String)> = vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.product_name.clone(),
            ),
        ];

        let url = format!("{}/checkout/sessions", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        tracing::debug!(status = %status, "stripe create session response");

        if !status.is_success() {
            let error = Self::parse_error(status, &body);
            tracing::error!(error = %error, "stripe session creation failed");
            return Err(error);
        }

        let session: StripeSession = serde_json::from_str(&body)
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        let session_url = session
            .url
            .ok_or_else(|| GatewayError::InvalidResponse("session url missing".to_string()))?;

        tracing::info!(
            session_id = %session.id,
            amount = %request.amount,
            currency = %request.currency,
            "stripe checkout session created"
        );

        Ok(CheckoutSession {
            id: session.id,
            url: session_url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}/checkout/sessions/{}", self.config.api_base_url, session_id);
        let response = self
            .client
            .get(&url)
            .basic_auth(self.config.secret_key.expose_secret(), Option::<&str>::None)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let error = Self::parse_error(status, &body);
            tracing::error!(session_id, error = %error, "stripe session retrieval failed");
            return Err(error);
        }

        let session: StripeSession = serde_json::from_str(&body)
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        let settled = session.payment_status.as_deref() == Some("paid");

        Ok(SessionStatus { settled })
    }
}

/// Scripted gateway for tests.
pub struct MockGateway {
    settled: AtomicBool,
    fail: AtomicBool,
    open_count: AtomicU64,
    status_count: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            settled: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            open_count: AtomicU64::new(0),
            status_count: AtomicU64::new(0),
        }
    }

    /// A gateway whose every call fails, as an unreachable backend would.
    pub fn failing() -> Self {
        let gateway = Self::new();
        gateway.fail.store(true, Ordering::SeqCst);
        gateway
    }

    pub fn set_settled(&self, settled: bool) {
        self.settled.store(settled, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> u64 {
        self.status_count.load(Ordering::SeqCst)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn open_session(
        &self,
        _request: &SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Connection(
                "mock gateway unreachable".to_string(),
            ));
        }
        let n = self.open_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            id: format!("cs_mock_{n}"),
            url: format!("https://checkout.mock/cs_mock_{n}"),
        })
    }

    async fn session_status(&self, _session_id: &str) -> Result<SessionStatus, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Connection(
                "mock gateway unreachable".to_string(),
            ));
        }
        self.status_count.fetch_add(1, Ordering::SeqCst);
        Ok(SessionStatus {
            settled: self.settled.load(Ordering::SeqCst),
        })
    }
}
