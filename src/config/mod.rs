use std::env;

use anyhow::Result;
use dotenvy::dotenv;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub stripe: StripeConfig,
    pub telegram: TelegramConfig,
    pub payments: PaymentsConfig,
    pub scanner: ScannerConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.expose_secret().is_empty()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: Secret<String>,
    pub chat_id: String,
    pub api_base_url: String,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.expose_secret().is_empty() && !self.chat_id.is_empty()
    }
}

/// Checkout settings: the currency sessions are priced in and the callback
/// URL prefixes the gateway redirects to. The success URL is suffixed with
/// `/{rental_id}?type={payment_type}`, the cancel URL with `/{rental_id}`.
#[derive(Deserialize, Clone, Debug)]
pub struct PaymentsConfig {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let db_url = env::var("RENTAL_DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name =
            env::var("RENTAL_DATABASE_NAME").unwrap_or_else(|_| "car_rental".to_string());

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_api_base_url = env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());
        let stripe_timeout_seconds = env::var("STRIPE_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let telegram_chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
        let telegram_api_base_url = env::var("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());

        let currency = env::var("RENTAL_PAYMENT_CURRENCY").unwrap_or_else(|_| "usd".to_string());
        let success_url = env::var("RENTAL_PAYMENT_SUCCESS_URL")
            .unwrap_or_else(|_| "http://localhost:8080/payments/success".to_string());
        let cancel_url = env::var("RENTAL_PAYMENT_CANCEL_URL")
            .unwrap_or_else(|_| "http://localhost:8080/payments/cancel".to_string());

        let scanner_enabled = env::var("RENTAL_SCANNER_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        // reference cadence: once a day
        let scanner_interval_seconds = env::var("RENTAL_SCANNER_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()?;

        Ok(Self {
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            stripe: StripeConfig {
                secret_key: Secret::new(stripe_secret_key),
                api_base_url: stripe_api_base_url,
                timeout_seconds: stripe_timeout_seconds,
            },
            telegram: TelegramConfig {
                bot_token: Secret::new(telegram_bot_token),
                chat_id: telegram_chat_id,
                api_base_url: telegram_api_base_url,
            },
            payments: PaymentsConfig {
                currency,
                success_url,
                cancel_url,
            },
            scanner: ScannerConfig {
                enabled: scanner_enabled,
                interval_seconds: scanner_interval_seconds,
            },
            service_name: "rental-service".to_string(),
        })
    }
}
