//! SMTP email delivery

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::notify::report::{render, RenderedReport};
use crate::notify::{DeliveryReceipt, Notifier, Report};
use crate::storage::settings::EmailConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Port using TLS from the first byte rather than STARTTLS
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends reports as plain-text email over authenticated SMTP
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
    host: String,
}

impl SmtpMailer {
    /// Build the mailer. Addresses and relay settings are checked here, so
    /// a bad configuration fails at startup.
    pub fn new(config: &EmailConfig, host: impl Into<String>) -> Result<Self, AgentError> {
        let from = parse_mailbox(&config.from, "EMAIL_FROM")?;
        let to = config
            .recipients
            .iter()
            .map(|r| parse_mailbox(r, "EMAIL_RECIPIENTS"))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            debug!("Using implicit TLS for {}:{}", config.smtp_host, config.smtp_port);
            SmtpTransport::relay(&config.smtp_host)
        } else {
            debug!("Using STARTTLS for {}:{}", config.smtp_host, config.smtp_port);
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| AgentError::ConfigError(format!("SMTP relay {}: {}", config.smtp_host, e)))?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.expose_secret().to_string(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            host: host.into(),
        })
    }

    fn build_message(&self, rendered: RenderedReport) -> Result<Message, AgentError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(rendered.subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(rendered.body)
            .map_err(|e| AgentError::NotifyError(format!("Failed to build email: {}", e)))
    }
}

fn parse_mailbox(address: &str, field: &str) -> Result<Mailbox, AgentError> {
    address
        .parse()
        .map_err(|e| AgentError::ConfigError(format!("{} {:?}: {}", field, address, e)))
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, report: &Report) -> Result<DeliveryReceipt, AgentError> {
        let message = self.build_message(render(report, &self.host))?;
        let transport = self.transport.clone();
        let recipients = self.to.len();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| AgentError::NotifyError(format!("Mail task failed: {}", e)))?
            .map_err(|e| AgentError::NotifyError(format!("SMTP error: {}", e)))?;

        info!("{:?} email sent to {} recipients", report.kind(), recipients);
        Ok(DeliveryReceipt { recipients })
    }
}
