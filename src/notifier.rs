use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EvolutionConfig;

/// NotificationService Contract
///
/// Outbound WhatsApp text delivery. The contract is a plain boolean: callers only
/// learn whether the message eventually went out, never why it did not.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_text(&self, phone_e164: &str, text: &str) -> bool;
}

/// NotifierState
///
/// The concrete type used to share the notifier across the application state.
pub type NotifierState = Arc<dyn NotificationService>;

/// Failure of a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// RetryPolicy
///
/// Attempt `n` (zero-based) that fails waits `base_delay * 2^n` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// EvolutionNotifier
///
/// Sends messages through an Evolution API instance
/// (`POST {base}/message/sendText/{instance}` authenticated by the `apikey` header).
#[derive(Clone)]
pub struct EvolutionNotifier {
    client: reqwest::Client,
    config: EvolutionConfig,
    retry: RetryPolicy,
}

impl EvolutionNotifier {
    pub fn new(config: EvolutionConfig) -> Self {
        Self::with_retry(config, RetryPolicy::default())
    }

    pub fn with_retry(config: EvolutionConfig, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            retry,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/message/sendText/{}",
            self.config.base_url, self.config.instance
        )
    }

    async fn attempt(&self, number: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("apikey", &self.config.api_key)
            .json(&json!({ "number": number, "text": text }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status()))
        }
    }
}

#[async_trait]
impl NotificationService for EvolutionNotifier {
    async fn send_text(&self, phone_e164: &str, text: &str) -> bool {
        // Evolution expects the bare digits.
        let number = phone_e164.trim_start_matches('+');

        for attempt in 0..self.retry.max_attempts {
            match self.attempt(number, text).await {
                Ok(()) => {
                    tracing::info!(attempt = attempt + 1, "whatsapp message delivered");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "whatsapp delivery failed");
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            attempts = self.retry.max_attempts,
            "giving up on whatsapp delivery"
        );
        false
    }
}

/// LoggingNotifier
///
/// Stand-in used when no Evolution instance is configured (local development). Logs
/// the message and reports success.
#[derive(Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationService for LoggingNotifier {
    async fn send_text(&self, phone_e164: &str, text: &str) -> bool {
        tracing::info!(to = %phone_e164, %text, "whatsapp delivery disabled; message logged only");
        true
    }
}

/// MockNotifier
///
/// Records every message for assertions; `should_fail` makes every send report failure.
#[derive(Clone, Default)]
pub struct MockNotifier {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Messages recorded so far, as `(phone, text)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationService for MockNotifier {
    async fn send_text(&self, phone_e164: &str, text: &str) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((phone_e164.to_string(), text.to_string()));
        }
        !self.should_fail
    }
}
