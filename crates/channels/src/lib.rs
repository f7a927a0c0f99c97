//! Email channel: template/sender/domain directory, merge-field
//! rendering, and the mail-sender contract the automation engine
//! delivers through.

pub mod email;
pub mod templates;

pub use email::{CaptureMailer, Mailer, OutgoingEmail, SentReceipt, SmtpRelayMailer};
pub use templates::{
    ChannelDirectory, EmailTemplate, ResolveError, ResolvedEmail, SenderIdentity, SendingDomain,
};
