//! Outbound SMS transports
//!
//! A transport only delivers. Consent is checked by the outbound gate
//! before any transport is reached, and a failed delivery is reported as
//! `None` without retrying.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use totl_common::config::{MessagingConfig, MessagingProvider};
use totl_common::phone::PhoneKey;
use totl_common::{Error, Result};
use tracing::{info, warn};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const TWILIO_TIMEOUT_SECS: u64 = 15;

/// Delivery boundary for outbound text messages
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a message; returns the provider message id, or `None` when
    /// the message was not accepted
    async fn send(&self, to: &PhoneKey, body: &str, media_url: Option<&str>) -> Option<String>;
}

/// Logs messages instead of delivering them
#[derive(Debug, Default)]
pub struct SimulatedTransport;

#[async_trait]
impl MessageTransport for SimulatedTransport {
    async fn send(&self, to: &PhoneKey, body: &str, media_url: Option<&str>) -> Option<String> {
        let message_id = format!("SIM-{}", uuid::Uuid::new_v4());
        info!(
            phone = %to,
            message_id = %message_id,
            media = media_url.unwrap_or(""),
            "Simulated SMS: {}",
            body
        );
        Some(message_id)
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

/// Twilio Programmable Messaging REST client
pub struct TwilioTransport {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioTransport {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TWILIO_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            account_sid,
            auth_token,
            from_number,
        })
    }
}

#[async_trait]
impl MessageTransport for TwilioTransport {
    async fn send(&self, to: &PhoneKey, body: &str, media_url: Option<&str>) -> Option<String> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, self.account_sid
        );

        let mut form = vec![
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", body),
        ];
        if let Some(media_url) = media_url {
            form.push(("MediaUrl", media_url));
        }

        let response = match self
            .http_client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(phone = %to, error = %e, "Twilio request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(phone = %to, status = status.as_u16(), detail = %detail, "Twilio rejected message");
            return None;
        }

        match response.json::<TwilioMessage>().await {
            Ok(message) => {
                info!(phone = %to, message_id = %message.sid, "SMS sent");
                Some(message.sid)
            }
            Err(e) => {
                warn!(phone = %to, error = %e, "Twilio response unreadable");
                None
            }
        }
    }
}

/// Build the transport selected by `[messaging] provider`
pub fn transport_from_config(config: &MessagingConfig) -> Result<Arc<dyn MessageTransport>> {
    match config.provider {
        MessagingProvider::Simulated => Ok(Arc::new(SimulatedTransport)),
        MessagingProvider::Twilio => {
            let (Some(sid), Some(token), Some(from)) = (
                config.account_sid.clone(),
                config.auth_token.clone(),
                config.from_number.clone(),
            ) else {
                return Err(Error::Config(
                    "messaging.provider = \"twilio\" requires account_sid, auth_token and from_number"
                        .to_string(),
                ));
            };
            Ok(Arc::new(TwilioTransport::new(sid, token, from)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_transport_returns_synthetic_id() {
        let id = SimulatedTransport
            .send(&PhoneKey::parse("555-000-1111"), "hello", None)
            .await
            .unwrap();
        assert!(id.starts_with("SIM-"));
    }

    #[test]
    fn test_twilio_requires_credentials() {
        let config = MessagingConfig {
            provider: MessagingProvider::Twilio,
            account_sid: Some("AC123".to_string()),
            ..MessagingConfig::default()
        };
        assert!(matches!(transport_from_config(&config), Err(Error::Config(_))));
    }
}
