//! Outbound email boundary.
//!
//! The scheduler and the dispatch notification flow both send mail; this
//! trait keeps them testable without a real SMTP or API client.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use agroflow_core::TenantId;

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub tenant_id: TenantId,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email has no recipients")]
    NoRecipients,

    #[error("mail transport failed: {0}")]
    Transport(String),
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

impl<M> Mailer for Arc<M>
where
    M: Mailer + ?Sized,
{
    fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        (**self).send(message)
    }
}

/// Mailer that records every message instead of delivering it.
///
/// Used in tests and as the default transport in dev, where outbound mail
/// is unwanted.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        Ok(())
    }
}
