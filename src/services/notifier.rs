//! Outbound notification channel.
//!
//! Delivery is best-effort: the engine never fails an operation because a
//! notice could not be sent. Services go through [`send_best_effort`], which
//! downgrades delivery errors to a warning.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::TelegramConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier not configured")]
    NotConfigured,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Sends `text`, logging a warning instead of propagating delivery failures.
pub async fn send_best_effort(notifier: &dyn Notifier, text: &str) {
    if let Err(err) = notifier.notify(text).await {
        tracing::warn!(error = %err, "notification delivery failed");
    }
}

/// Telegram bot channel, the production notifier.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if !self.config.is_configured() {
            return Err(NotifyError::NotConfigured);
        }

        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url,
            self.config.bot_token.expose_secret()
        );

        let response = self
            .client
            .get(&url)
            .query(&[("chat_id", self.config.chat_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|err| NotifyError::Connection(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "telegram returned {status}: {body}"
            )));
        }

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|err| NotifyError::SendFailed(err.to_string()))?;

        if !body.ok {
            return Err(NotifyError::SendFailed(
                body.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        tracing::debug!(length = text.len(), "telegram notice sent");
        Ok(())
    }
}

/// Recording notifier for tests.
pub struct MockNotifier {
    messages: std::sync::Mutex<Vec<String>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            messages: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A notifier whose every delivery attempt fails.
    pub fn failing() -> Self {
        Self {
            messages: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier mutex poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.messages.lock().expect("notifier mutex poisoned").len()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::SendFailed("mock delivery failure".to_string()));
        }
        self.messages
            .lock()
            .expect("notifier mutex poisoned")
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TelegramConfig {
        TelegramConfig {
            bot_token: Secret::new("test-token".to_string()),
            chat_id: "42".to_string(),
            api_base_url: server.uri(),
        }
    }

    #[tokio::test]
    async fn sends_message_through_bot_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottest-token/sendMessage"))
            .and(query_param("chat_id", "42"))
            .and(query_param("text", "hello"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config_for(&server));
        notifier.notify("hello").await.unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_a_send_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "ok": false, "description": "chat not found" }),
            ))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config_for(&server));
        let err = notifier.notify("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::SendFailed(_)));
    }

    #[tokio::test]
    async fn unconfigured_notifier_refuses_to_send() {
        let notifier = TelegramNotifier::new(TelegramConfig {
            bot_token: Secret::new(String::new()),
            chat_id: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
        });
        let err = notifier.notify("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured));
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let notifier = MockNotifier::failing();
        send_best_effort(&notifier, "lost notice").await;
        assert_eq!(notifier.sent_count(), 0);
    }
}
