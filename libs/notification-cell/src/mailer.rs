use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::models::EmailMessage;

/// Outbound mail. Slot cancellations and finished reports go through this.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: EmailMessage) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let from: Mailbox = config.mail_from.parse()
            .map_err(|e| anyhow!("Invalid MAIL_FROM address '{}': {}", config.mail_from, e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: EmailMessage) -> Result<Message> {
        let address: Address = email.to.parse()
            .map_err(|e| anyhow!("Invalid recipient address '{}': {}", email.to, e))?;
        let to = Mailbox::new(email.to_name, address);

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject);

        let body = MultiPart::alternative_plain_html(email.text_body, email.html_body);

        let message = match email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| anyhow!("Invalid attachment content type: {:?}", e))?;
                builder.multipart(
                    MultiPart::mixed()
                        .multipart(body)
                        .singlepart(Attachment::new(attachment.filename).body(attachment.content, content_type)),
                )?
            }
            None => builder.multipart(body)?,
        };

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: EmailMessage) -> Result<()> {
        let recipient = email.to.clone();
        let subject = email.subject.clone();
        let message = self.build_message(email)?;

        self.transport.send(message).await?;
        info!("Email '{}' sent to {}", subject, recipient);
        Ok(())
    }
}

/// Stand-in used when SMTP is not configured. Logs and drops the message.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, email: EmailMessage) -> Result<()> {
        debug!("Mail disabled, dropping '{}' for {}", email.subject, email.to);
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    if !config.is_mail_configured() {
        return Arc::new(NoopMailer);
    }

    match SmtpMailer::from_config(config) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            warn!("SMTP configuration rejected ({}), mail disabled", e);
            Arc::new(NoopMailer)
        }
    }
}
