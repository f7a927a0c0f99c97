//! Mail-sender contract and providers. The engine only sees the
//! `Mailer` trait; delivery infrastructure, webhooks, and bounce
//! handling live behind it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use sendcraft_core::config::MailConfig;
use sendcraft_core::error::{SendcraftError, SendcraftResult};

/// A fully rendered email ready for handoff to a provider.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from_name: String,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Provider acknowledgement for one accepted message.
#[derive(Debug, Clone)]
pub struct SentReceipt {
    /// Provider-assigned message id, used for engagement attribution.
    pub message_id: String,
}

/// Trait for handing a rendered email to a delivery provider. Errors are
/// propagated to the job queue for its retry policy; implementations do
/// not retry internally.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &OutgoingEmail) -> SendcraftResult<SentReceipt>;
}

/// SMTP relay provider stub. In production: submission to the configured
/// relay over SMTP with DKIM signing.
pub struct SmtpRelayMailer {
    config: MailConfig,
}

impl SmtpRelayMailer {
    pub fn new(config: MailConfig) -> Self {
        info!(from_name = %config.default_from_name, "SMTP relay mailer initialized");
        Self { config }
    }
}

impl Mailer for SmtpRelayMailer {
    fn send(&self, email: &OutgoingEmail) -> SendcraftResult<SentReceipt> {
        debug!(
            to = %email.to_email,
            from = %email.from_email,
            subject = %email.subject,
            "Submitting email to relay"
        );

        metrics::counter!("sendcraft.emails_sent", "provider" => "smtp_relay").increment(1);

        let message_id = format!("{}-{}", self.config.message_id_prefix, Uuid::new_v4());
        Ok(SentReceipt { message_id })
    }
}

/// Capture mailer for tests: records outgoing emails instead of sending,
/// optionally failing every send to exercise error propagation.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail_sends: bool,
}

impl CaptureMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: false,
        }
    }

    /// A mailer whose every send fails, for testing failure paths.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Mailer for CaptureMailer {
    fn send(&self, email: &OutgoingEmail) -> SendcraftResult<SentReceipt> {
        if self.fail_sends {
            return Err(SendcraftError::Mail("relay unavailable".to_string()));
        }
        self.sent.lock().push(email.clone());
        let message_id = format!("capture-{}", Uuid::new_v4());
        Ok(SentReceipt { message_id })
    }
}

/// Convenience: a capture mailer for tests.
pub fn capture_mailer() -> Arc<CaptureMailer> {
    Arc::new(CaptureMailer::new())
}
