//! SMTP e-mail sink (STARTTLS)

use super::{EmailSettings, NotificationSink};
use crate::error::{Result, ScannerError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends HTML mail from the configured account to itself
pub struct EmailSink {
    settings: EmailSettings,
}

fn send_error(e: impl std::fmt::Display) -> ScannerError {
    ScannerError::NotificationSend(format!("E-mail: {}", e))
}

impl EmailSink {
    pub fn new(settings: &EmailSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn build_message(&self, subject: &str, html_body: &str) -> Result<Message> {
        let mailbox: Mailbox = self.settings.address.parse().map_err(send_error)?;

        Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.replace('\n', "<br>\n"))
            .map_err(send_error)
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "E-mail"
    }

    async fn send(&self, subject: &str, html_body: &str) -> Result<()> {
        let message = self.build_message(subject, html_body)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_server)
            .map_err(send_error)?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.address.clone(),
                self.settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        mailer.send(message).await.map_err(send_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(address: &str) -> EmailSettings {
        EmailSettings {
            address: address.to_string(),
            password: "secret".to_string(),
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
        }
    }

    #[test]
    fn test_message_is_html_to_self() {
        let sink = EmailSink::new(&settings("alerts@example.com"));
        let message = sink
            .build_message("Krypto Scanner Alert: BTC/USDT", "line one\nline two")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: alerts@example.com"));
        assert!(raw.contains("To: alerts@example.com"));
        assert!(raw.contains("Subject: Krypto Scanner Alert: BTC/USDT"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("line one<br>"));
    }

    #[test]
    fn test_invalid_address_is_send_error() {
        let sink = EmailSink::new(&settings("not an address"));
        let err = sink.build_message("s", "b").unwrap_err();
        assert!(matches!(err, ScannerError::NotificationSend(_)));
    }
}
