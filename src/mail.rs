use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::token::SecretToken;

/// Templates the authentication flows send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    VerifyEmail,
    ResetPassword,
}

impl MailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            MailTemplate::VerifyEmail => "email_verify",
            MailTemplate::ResetPassword => "email_reset_password",
        }
    }
}

/// OutboundMail
///
/// A message carrying an out-of-band secret. Rendering and delivery belong to the mail
/// collaborator.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub recipient: String,
    pub username: String,
    pub template: MailTemplate,
    pub token: SecretToken,
}

#[derive(Debug, Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Mailer
///
/// Delivery contract for out-of-band messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// LogMailer
///
/// Development mailer: records that a message would have been sent, without the secret.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        tracing::info!(
            recipient = %mail.recipient,
            template = mail.template.name(),
            "Mail dispatched"
        );
        Ok(())
    }
}
