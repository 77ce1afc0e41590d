use async_trait::async_trait;
use log::*;
use shop_engine::traits::{Email, Mailer, MailerError};

/// A [`Mailer`] that writes every message to the log instead of delivering it. Attach a real transport through the
/// same trait to send mail.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        if email.to.trim().is_empty() {
            return Err(MailerError::DeliveryFailed { to: email.to, reason: "No recipient".into() });
        }
        info!("📬️ To: {} Subject: {}", email.to, email.subject);
        debug!("📬️ {}", email.body);
        Ok(())
    }
}
