//! Email template, sender identity, and sending domain directory.
//! Resolves an automation step's template and sender references into a
//! ready-to-send email envelope, and renders merge fields.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use sendcraft_core::types::Contact;

/// A stored email template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub audience_id: Uuid,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// A from-address users send as. Must be verified before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub verified: bool,
}

/// A DNS-verified domain sender identities may send from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingDomain {
    pub id: Uuid,
    pub domain: String,
    pub verified: bool,
}

/// A template joined with its sender, ready for merge-field rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEmail {
    pub from_name: String,
    pub from_email: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Why a template/sender pair could not be resolved. All variants are
/// soft conditions for the automation engine: the referenced entity was
/// deleted or is not yet usable, so the step is skipped, not failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("email template {0} no longer exists")]
    TemplateMissing(Uuid),
    #[error("sender identity {0} no longer exists")]
    SenderMissing(Uuid),
    #[error("sender identity {0} is not verified")]
    SenderUnverified(Uuid),
    #[error("no verified sending domain for `{0}`")]
    DomainUnverified(String),
}

/// Directory of templates, sender identities, and sending domains.
#[derive(Default)]
pub struct ChannelDirectory {
    templates: DashMap<Uuid, EmailTemplate>,
    senders: DashMap<Uuid, SenderIdentity>,
    domains: DashMap<Uuid, SendingDomain>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            senders: DashMap::new(),
            domains: DashMap::new(),
        }
    }

    pub fn register_template(&self, template: EmailTemplate) -> Uuid {
        let id = template.id;
        self.templates.insert(id, template);
        id
    }

    pub fn remove_template(&self, id: &Uuid) -> Option<EmailTemplate> {
        self.templates.remove(id).map(|(_, t)| t)
    }

    pub fn get_template(&self, id: &Uuid) -> Option<EmailTemplate> {
        self.templates.get(id).map(|t| t.clone())
    }

    pub fn register_sender(&self, sender: SenderIdentity) -> Uuid {
        let id = sender.id;
        self.senders.insert(id, sender);
        id
    }

    pub fn register_domain(&self, domain: SendingDomain) -> Uuid {
        let id = domain.id;
        self.domains.insert(id, domain);
        id
    }

    /// Join a template with a sender identity, requiring the identity to
    /// be verified and its domain registered and verified.
    pub fn resolve_email(
        &self,
        template_id: &Uuid,
        sender_identity_id: &Uuid,
    ) -> Result<ResolvedEmail, ResolveError> {
        let template = self
            .get_template(template_id)
            .ok_or(ResolveError::TemplateMissing(*template_id))?;
        let sender = self
            .senders
            .get(sender_identity_id)
            .map(|s| s.clone())
            .ok_or(ResolveError::SenderMissing(*sender_identity_id))?;
        if !sender.verified {
            return Err(ResolveError::SenderUnverified(sender.id));
        }

        let sender_domain = sender.email.rsplit('@').next().unwrap_or_default();
        let domain_ok = self
            .domains
            .iter()
            .any(|d| d.verified && d.domain.eq_ignore_ascii_case(sender_domain));
        if !domain_ok {
            return Err(ResolveError::DomainUnverified(sender_domain.to_string()));
        }

        Ok(ResolvedEmail {
            from_name: sender.name,
            from_email: sender.email,
            subject: template.subject,
            html: template.html_body,
            text: template.text_body,
        })
    }
}

/// Substitute `{{ field }}` merge fields with contact attributes.
/// Supported fields: `email`, `first_name`, `last_name`.
pub fn render(input: &str, contact: &Contact) -> String {
    let fields = [
        ("email", contact.email.as_str()),
        ("first_name", contact.first_name.as_deref().unwrap_or("")),
        ("last_name", contact.last_name.as_deref().unwrap_or("")),
    ];
    let mut output = input.to_string();
    for (name, value) in fields {
        output = output.replace(&format!("{{{{ {name} }}}}"), value);
        output = output.replace(&format!("{{{{{name}}}}}"), value);
    }
    output
}
