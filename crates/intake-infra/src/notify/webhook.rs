use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;

use super::{Subscriber, TopicMessage};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Intake-Signature";

/// Sign a webhook body with HMAC-SHA256, hex encoded.
pub fn sign_payload(body: &str, secret: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("Invalid signing secret")?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Posts each notification as JSON to a fixed URL.
pub struct WebhookSubscriber {
    name: String,
    url: String,
    signing_secret: Option<String>,
    http_client: Client,
}

impl WebhookSubscriber {
    pub fn new(url: impl Into<String>, signing_secret: Option<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client for webhooks")?;

        Ok(Self {
            name: format!("webhook:{}", url),
            url,
            signing_secret,
            http_client,
        })
    }
}

#[async_trait]
impl Subscriber for WebhookSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, message), fields(url = %self.url, message_id = %message.message_id))]
    async fn deliver(&self, message: &TopicMessage) -> Result<()> {
        let body = serde_json::to_string(message).context("Failed to serialize webhook payload")?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Intake-Webhook/1.0");

        if let Some(secret) = &self.signing_secret {
            let signature = sign_payload(&body, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "Webhook delivered");
            return Ok(());
        }

        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Failed to read response body"));
        Err(anyhow::anyhow!(
            "Webhook returned non-2xx status: {} - {}",
            status.as_u16(),
            response_body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_payload_matches_reference_vector() {
        let signature =
            sign_payload("The quick brown fox jumps over the lazy dog", "key").unwrap();
        assert_eq!(
            signature,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let body = r#"{"topic":"alerts"}"#;
        assert_ne!(
            sign_payload(body, "one").unwrap(),
            sign_payload(body, "two").unwrap()
        );
    }

    #[test]
    fn test_subscriber_name_includes_url() {
        let subscriber =
            WebhookSubscriber::new("https://hooks.example/intake", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(subscriber.name(), "webhook:https://hooks.example/intake");
    }
}
