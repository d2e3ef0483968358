//! Verification code delivery.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Sends a verification code to a phone.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), DeliveryError>;
}

fn message_body(code: &str) -> String {
    format!("Your verification code is {}", code)
}

/// Delivers codes as SMS through the notification service's HTTP API.
pub struct NotificationDelivery {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    to: &'a str,
    body: String,
    metadata: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Deserialize)]
struct SendSmsResponse {
    notification_id: String,
    status: String,
}

impl NotificationDelivery {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::Configuration(e.to_string()))?;

        let endpoint = format!("{}/notifications/sms", base_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, "Notification delivery configured");

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CodeDelivery for NotificationDelivery {
    #[tracing::instrument(skip(self, code))]
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), DeliveryError> {
        let request = SendSmsRequest {
            to: phone,
            body: message_body(code),
            metadata: HashMap::from([("source", "access-service")]),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                DeliveryError::Connection(format!("Failed to reach notification service: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::SendFailed(format!(
                "Notification service returned {}: {}",
                status, body
            )));
        }

        let sent: SendSmsResponse = response.json().await.map_err(|e| {
            DeliveryError::SendFailed(format!("Failed to parse notification response: {}", e))
        })?;

        tracing::info!(
            notification_id = %sent.notification_id,
            status = %sent.status,
            "Verification code queued"
        );

        Ok(())
    }
}

/// Development delivery: logs that a code was issued instead of sending it.
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), DeliveryError> {
        tracing::warn!(
            phone = %phone,
            code_length = code.len(),
            "No notification service configured; verification code not sent"
        );
        Ok(())
    }
}

/// Records delivered codes so tests can read them back.
#[derive(Default)]
pub struct MockCodeDelivery {
    codes: DashMap<String, Vec<String>>,
    failing: AtomicBool,
    sent: AtomicUsize,
}

impl MockCodeDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.codes
            .get(phone)
            .and_then(|codes| codes.last().cloned())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeDelivery for MockCodeDelivery {
    async fn deliver(&self, phone: &str, code: &str) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Connection("mock delivery failure".to_string()));
        }
        self.codes
            .entry(phone.to_string())
            .or_default()
            .push(code.to_string());
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_codes() {
        let mock = MockCodeDelivery::new();
        mock.deliver("+15550100", "111111").await.unwrap();
        mock.deliver("+15550100", "222222").await.unwrap();
        assert_eq!(mock.last_code_for("+15550100").as_deref(), Some("222222"));
        assert_eq!(mock.sent_count(), 2);

        mock.set_failing(true);
        assert!(mock.deliver("+15550100", "333333").await.is_err());
        assert_eq!(mock.sent_count(), 2);
    }

    #[test]
    fn test_notification_endpoint() {
        let delivery = NotificationDelivery::new("http://notifications:8080/", 5).unwrap();
        assert_eq!(delivery.endpoint, "http://notifications:8080/notifications/sms");
    }

    #[test]
    fn test_message_body_carries_code() {
        assert!(message_body("123456").ends_with("123456"));
    }
}
