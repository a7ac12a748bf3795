use async_trait::async_trait;

use super::message::EmailMessage;

#[derive(Debug, thiserror::Error)]
#[error("Failed to send email to {to}: {reason}")]
pub struct MailError {
    pub to: String,
    pub reason: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError>;
}

/// Writes the email to the log instead of delivering it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body_len = email.body.len(),
            "📧 Email sent"
        );
        Ok(())
    }
}
