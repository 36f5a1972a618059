use super::Notifier;
use crate::config::EmailSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Port on which SMTP is spoken over implicit TLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP notifier. Port 465 uses implicit TLS, anything else STARTTLS.
pub struct EmailNotifier {
    settings: EmailSettings,
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Notify(format!("{} is not set", name)))
    }

    fn build_message(&self, text: &str) -> Result<Message> {
        let username = Self::required(&self.settings.username, "NOTIFY_EMAIL_USERNAME")?;
        let sender: Address = username.parse().map_err(|e| {
            Error::Notify(format!("Invalid sender address '{}': {}", username, e))
        })?;
        if self.settings.to.is_empty() {
            return Err(Error::Notify("NOTIFY_EMAIL_TO is not set".to_string()));
        }

        let mut builder = Message::builder()
            .from(Mailbox::new(Some(self.settings.from_name.clone()), sender))
            .subject(self.settings.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.settings.to {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                Error::Notify(format!("Invalid recipient '{}': {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }
        builder
            .body(text.to_string())
            .map_err(|e| Error::Notify(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = Self::required(&self.settings.host, "NOTIFY_EMAIL_HOST")?;
        let builder = if self.settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| Error::Notify(format!("Invalid SMTP host '{}': {}", host, e)))?;

        let mut builder = builder.port(self.settings.port);
        if let (Some(username), Some(password)) = (&self.settings.username, &self.settings.password)
        {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let message = self.build_message(text)?;
        let transport = self.transport()?;
        transport
            .send(message)
            .await
            .map_err(|e| Error::Notify(format!("SMTP delivery failed: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
