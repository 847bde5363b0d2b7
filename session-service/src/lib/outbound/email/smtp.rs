use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;

use crate::config::EmailConfig;
use crate::errors::EmailDeliveryError;
use crate::session::models::EmailMessage;
use crate::session::ports::EmailSender;

/// Plain-text email over SMTP.
///
/// Without credentials the transport talks unencrypted to the host, which
/// suits a local relay or mail catcher.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build the transport once; connections are opened per message.
    ///
    /// # Errors
    /// * `InvalidAddress` - Configured sender address does not parse
    /// * `DeliveryFailed` - TLS relay could not be set up for the host
    pub fn new(config: &EmailConfig) -> Result<Self, EmailDeliveryError> {
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| EmailDeliveryError::InvalidAddress(format!("from: {}", e)))?;

        let transport = if config.smtp_username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let credentials =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| {
                    EmailDeliveryError::DeliveryFailed(format!("SMTP relay setup failed: {}", e))
                })?
                .port(config.smtp_port)
                .credentials(credentials)
                .build()
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailDeliveryError> {
        let to = message
            .to
            .parse::<Mailbox>()
            .map_err(|e| EmailDeliveryError::InvalidAddress(format!("to: {}", e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| EmailDeliveryError::BuildFailed(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| EmailDeliveryError::DeliveryFailed(e.to_string()))?;

        tracing::debug!(subject = %message.subject, "Email delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 1025,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Platform".to_string(),
            notify_on_login: false,
        }
    }

    #[test]
    fn test_new_accepts_local_relay() {
        assert!(SmtpEmailSender::new(&config()).is_ok());
    }

    #[test]
    fn test_new_rejects_bad_sender() {
        let config = EmailConfig {
            from_email: "not an address".to_string(),
            ..config()
        };

        assert!(matches!(
            SmtpEmailSender::new(&config),
            Err(EmailDeliveryError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_send_rejects_bad_recipient() {
        let sender = SmtpEmailSender::new(&config()).unwrap();
        let message = EmailMessage {
            to: "nobody".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        };

        assert!(matches!(
            sender.send(&message).await,
            Err(EmailDeliveryError::InvalidAddress(_))
        ));
    }
}
