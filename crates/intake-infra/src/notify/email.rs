//! SMTP subscriber for operator mailboxes.

use async_trait::async_trait;
use intake_core::EmailConfig;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Subscriber, TopicMessage};

/// Sends each notification as a plain-text email.
pub struct EmailSubscriber {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailSubscriber {
    /// Build from config. Returns `None` when no recipients are configured or
    /// SMTP is not set up.
    pub fn from_config(config: &EmailConfig) -> anyhow::Result<Option<Self>> {
        if config.recipients.is_empty() {
            tracing::debug!("Email subscriber disabled (no EMAIL_RECIPIENTS)");
            return Ok(None);
        }
        let (Some(host), Some(from)) = (config.smtp_host.as_deref(), config.smtp_from.as_deref())
        else {
            return Ok(None);
        };

        let from: Mailbox = from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid SMTP_FROM: {}", e))?;
        let recipients: Vec<Mailbox> = config
            .recipients
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if recipients.is_empty() {
            return Err(anyhow::anyhow!("No valid recipient addresses in EMAIL_RECIPIENTS"));
        }

        let credentials = match (&config.smtp_user, &config.smtp_password) {
            (Some(u), Some(p)) => Some(Credentials::new(u.clone(), p.clone())),
            _ => None,
        };

        let mailer = if config.smtp_tls {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| anyhow::anyhow!("Invalid SMTP relay {}: {}", host, e))?
                .port(config.smtp_port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            tracing::info!(host = %host, port = config.smtp_port, "Email subscriber initialized (SMTP with STARTTLS)");
            builder.build()
        } else {
            let mut builder =
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(config.smtp_port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            tracing::info!(host = %host, port = config.smtp_port, "Email subscriber initialized (SMTP)");
            builder.build()
        };

        Ok(Some(Self {
            mailer,
            from,
            recipients,
        }))
    }
}

#[async_trait]
impl Subscriber for EmailSubscriber {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, message: &TopicMessage) -> anyhow::Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("[{}] {}", message.topic, message.subject));
        for mb in &self.recipients {
            builder = builder.to(mb.clone());
        }
        let email = builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.message.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build email: {}", e))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| anyhow::anyhow!("SMTP send failed: {}", e))?;
        tracing::debug!(count = self.recipients.len(), message_id = %message.message_id, "Notification email sent");
        Ok(())
    }
}
