//! Notification topic and its subscribers

use anyhow::{Context, Result};
use intake_core::{IntakeConfig, RetryPolicy};
use intake_infra::{EmailSubscriber, LogSubscriber, Topic, WebhookSubscriber};
use std::sync::Arc;
use std::time::Duration;

/// Per-subscriber delivery retries within one publish.
fn delivery_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(5))
}

/// Build the topic from configured webhooks and email recipients. Falls back
/// to the log subscriber so notifications are never silently discarded.
pub fn build_topic(config: &IntakeConfig) -> Result<Topic> {
    let mut topic = Topic::new(config.pipeline.notification_topic.clone(), delivery_retry());

    let timeout = Duration::from_secs(config.webhook.timeout_seconds);
    for url in &config.webhook.urls {
        let subscriber = WebhookSubscriber::new(url.clone(), config.webhook.signing_secret.clone(), timeout)
            .with_context(|| format!("Failed to create webhook subscriber for {}", url))?;
        topic = topic.with_subscriber(Arc::new(subscriber));
    }

    if let Some(email) = EmailSubscriber::from_config(&config.email)? {
        topic = topic.with_subscriber(Arc::new(email));
    }

    if topic.subscriber_count() == 0 {
        tracing::warn!("No notification subscribers configured; notifications will only be logged");
        topic = topic.with_subscriber(Arc::new(LogSubscriber));
    }

    tracing::info!(
        topic = %config.pipeline.notification_topic,
        subscribers = topic.subscriber_count(),
        "Notification topic ready"
    );
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> IntakeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IntakeConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_log_subscriber_when_nothing_configured() {
        let topic = build_topic(&config(&[])).unwrap();
        assert_eq!(topic.subscriber_count(), 1);
    }

    #[test]
    fn test_one_subscriber_per_webhook_url() {
        let topic = build_topic(&config(&[(
            "WEBHOOK_URLS",
            "https://a.example.com/hook,https://b.example.com/hook",
        )]))
        .unwrap();
        assert_eq!(topic.subscriber_count(), 2);
    }
}
