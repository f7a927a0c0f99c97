//! Step runner registry: dispatch table from step subtype to its
//! side-effecting executor. Executors are written for at-least-once
//! delivery; tag mutations are naturally idempotent, email send is not
//! (redelivery can duplicate a send, and never blocks traversal).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sendcraft_channels::{ChannelDirectory, Mailer, OutgoingEmail};
use sendcraft_channels::templates::render;
use sendcraft_contacts::{ContactStore, TagStore};
use sendcraft_core::error::{SendcraftError, SendcraftResult};
use sendcraft_core::kv::KeyValueStore;
use sendcraft_core::types::{ActivityKind, Contact};

use crate::types::{AutomationStep, SendEmailConfig, StepKind, TagActionConfig};

/// How a step execution concluded. `Skipped` marks a documented soft
/// condition (referenced entity gone); traversal continues either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRun {
    Executed,
    Skipped { reason: String },
}

/// A side-effecting implementation behind one step subtype.
pub trait StepExecutor: Send + Sync {
    fn kind(&self) -> StepKind;
    fn run(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepRun>;
}

/// Dispatch table from step subtype to executor, populated at startup.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(&kind).cloned()
    }
}

/// Attribution key stored against a provider message id so engagement
/// webhooks can be traced back to the sending step and contact.
pub fn automation_step_key(step_id: Uuid, contact_id: Uuid) -> String {
    format!("AUTOMATION_STEP:{step_id}:{contact_id}")
}

/// Registry wired with the built-in executors.
pub fn default_registry(
    contacts: Arc<ContactStore>,
    tags: Arc<TagStore>,
    directory: Arc<ChannelDirectory>,
    mailer: Arc<dyn Mailer>,
    attribution: Arc<dyn KeyValueStore>,
) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(SendEmailExecutor {
        contacts: contacts.clone(),
        directory,
        mailer,
        attribution,
    }));
    registry.register(Arc::new(AddTagExecutor {
        contacts: contacts.clone(),
        tags: tags.clone(),
    }));
    registry.register(Arc::new(RemoveTagExecutor { contacts, tags }));
    registry.register(Arc::new(PlaceholderExecutor));
    registry
}

/// Resolves template and sender, renders merge fields, sends, and
/// records the provider message id for engagement attribution.
pub struct SendEmailExecutor {
    pub contacts: Arc<ContactStore>,
    pub directory: Arc<ChannelDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub attribution: Arc<dyn KeyValueStore>,
}

impl StepExecutor for SendEmailExecutor {
    fn kind(&self) -> StepKind {
        StepKind::ActionSendEmail
    }

    fn run(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepRun> {
        let config: SendEmailConfig = serde_json::from_value(step.configuration.clone())
            .map_err(|e| {
                SendcraftError::Config(format!(
                    "send-email step {} has invalid configuration: {e}",
                    step.id
                ))
            })?;

        let resolved = match self
            .directory
            .resolve_email(&config.template_id, &config.sender_identity_id)
        {
            Ok(resolved) => resolved,
            Err(reason) => {
                // The referenced entity was deleted or is unusable since
                // the step was configured; skip rather than poison the
                // contact's traversal.
                warn!(step_id = %step.id, contact_id = %contact.id, %reason, "Skipping email send");
                return Ok(StepRun::Skipped {
                    reason: reason.to_string(),
                });
            }
        };

        let email = OutgoingEmail {
            from_name: resolved.from_name,
            from_email: resolved.from_email,
            to_email: contact.email.clone(),
            subject: render(&resolved.subject, contact),
            html: render(&resolved.html, contact),
            text: render(&resolved.text, contact),
        };
        let receipt = self.mailer.send(&email)?;

        self.attribution.set(
            &receipt.message_id,
            &automation_step_key(step.id, contact.id),
        );
        self.contacts
            .record_activity(&contact.id, ActivityKind::SentAutomationEmail, Utc::now());

        info!(
            step_id = %step.id,
            contact_id = %contact.id,
            message_id = %receipt.message_id,
            "Sent automation email"
        );
        Ok(StepRun::Executed)
    }
}

/// Attaches the configured tag. Idempotent under redelivery.
pub struct AddTagExecutor {
    pub contacts: Arc<ContactStore>,
    pub tags: Arc<TagStore>,
}

impl StepExecutor for AddTagExecutor {
    fn kind(&self) -> StepKind {
        StepKind::ActionAddTag
    }

    fn run(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepRun> {
        let config = tag_config(step)?;
        if self.tags.get(&config.tag_id).is_none() {
            warn!(step_id = %step.id, tag_id = %config.tag_id, "Tag no longer exists, skipping");
            return Ok(StepRun::Skipped {
                reason: format!("tag {} no longer exists", config.tag_id),
            });
        }
        let changed = self.contacts.add_tag(&contact.id, config.tag_id);
        debug!(step_id = %step.id, contact_id = %contact.id, tag_id = %config.tag_id, changed, "Added tag");
        Ok(StepRun::Executed)
    }
}

/// Detaches the configured tag. Idempotent under redelivery.
pub struct RemoveTagExecutor {
    pub contacts: Arc<ContactStore>,
    pub tags: Arc<TagStore>,
}

impl StepExecutor for RemoveTagExecutor {
    fn kind(&self) -> StepKind {
        StepKind::ActionRemoveTag
    }

    fn run(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepRun> {
        let config = tag_config(step)?;
        if self.tags.get(&config.tag_id).is_none() {
            warn!(step_id = %step.id, tag_id = %config.tag_id, "Tag no longer exists, skipping");
            return Ok(StepRun::Skipped {
                reason: format!("tag {} no longer exists", config.tag_id),
            });
        }
        let changed = self.contacts.remove_tag(&contact.id, &config.tag_id);
        debug!(step_id = %step.id, contact_id = %contact.id, tag_id = %config.tag_id, changed, "Removed tag");
        Ok(StepRun::Executed)
    }
}

fn tag_config(step: &AutomationStep) -> SendcraftResult<TagActionConfig> {
    serde_json::from_value(step.configuration.clone()).map_err(|e| {
        SendcraftError::Config(format!(
            "tag action step {} has invalid configuration: {e}",
            step.id
        ))
    })
}

/// The synthesized NO-branch action: nothing to execute until the user
/// configures it into a real action.
pub struct PlaceholderExecutor;

impl StepExecutor for PlaceholderExecutor {
    fn kind(&self) -> StepKind {
        StepKind::ActionPlaceholder
    }

    fn run(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepRun> {
        debug!(step_id = %step.id, contact_id = %contact.id, "Placeholder step, nothing to execute");
        Ok(StepRun::Executed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sendcraft_channels::email::capture_mailer;
    use sendcraft_channels::{EmailTemplate, SenderIdentity, SendingDomain};
    use sendcraft_core::kv::memory_kv;

    fn stores() -> (Arc<ContactStore>, Arc<TagStore>, Uuid, Contact) {
        let contacts = Arc::new(ContactStore::new());
        let tags = Arc::new(TagStore::new());
        let audience_id = Uuid::new_v4();
        let contact = Contact::new(audience_id, "ada@x.com");
        contacts.insert(contact.clone());
        (contacts, tags, audience_id, contact)
    }

    fn step_with(kind: StepKind, configuration: serde_json::Value) -> AutomationStep {
        AutomationStep::new(Uuid::new_v4(), kind, configuration, None, None)
    }

    #[test]
    fn test_add_tag_is_idempotent() {
        let (contacts, tags, audience_id, contact) = stores();
        let tag = tags.create(audience_id, "vip");
        let executor = AddTagExecutor {
            contacts: contacts.clone(),
            tags,
        };
        let step = step_with(
            StepKind::ActionAddTag,
            serde_json::json!({"tag_id": tag.id}),
        );

        assert_eq!(executor.run(&step, &contact).unwrap(), StepRun::Executed);
        assert_eq!(executor.run(&step, &contact).unwrap(), StepRun::Executed);
        assert_eq!(contacts.get(&contact.id).unwrap().tags.len(), 1);
    }

    #[test]
    fn test_deleted_tag_soft_skips() {
        let (contacts, tags, _, contact) = stores();
        let executor = AddTagExecutor { contacts, tags };
        let step = step_with(
            StepKind::ActionAddTag,
            serde_json::json!({"tag_id": Uuid::new_v4()}),
        );
        assert!(matches!(
            executor.run(&step, &contact).unwrap(),
            StepRun::Skipped { .. }
        ));
    }

    #[test]
    fn test_malformed_tag_config_is_fatal() {
        let (contacts, tags, _, contact) = stores();
        let executor = AddTagExecutor { contacts, tags };
        let step = step_with(StepKind::ActionAddTag, serde_json::json!({"tag": "vip"}));
        assert!(matches!(
            executor.run(&step, &contact).unwrap_err(),
            SendcraftError::Config(_)
        ));
    }

    #[test]
    fn test_send_email_records_attribution_and_activity() {
        let (contacts, _, audience_id, contact) = stores();
        let directory = Arc::new(ChannelDirectory::new());
        let template_id = directory.register_template(EmailTemplate {
            id: Uuid::new_v4(),
            audience_id,
            name: "Welcome".to_string(),
            subject: "Hi {{ email }}".to_string(),
            html_body: "<p>Hi</p>".to_string(),
            text_body: "Hi".to_string(),
        });
        let sender_id = directory.register_sender(SenderIdentity {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            email: "news@acme.io".to_string(),
            verified: true,
        });
        directory.register_domain(SendingDomain {
            id: Uuid::new_v4(),
            domain: "acme.io".to_string(),
            verified: true,
        });

        let mailer = capture_mailer();
        let kv = memory_kv();
        let executor = SendEmailExecutor {
            contacts: contacts.clone(),
            directory,
            mailer: mailer.clone(),
            attribution: kv.clone(),
        };
        let step = step_with(
            StepKind::ActionSendEmail,
            serde_json::json!({
                "template_id": template_id,
                "sender_identity_id": sender_id,
            }),
        );

        assert_eq!(executor.run(&step, &contact).unwrap(), StepRun::Executed);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi ada@x.com");
        assert_eq!(sent[0].to_email, "ada@x.com");

        let updated = contacts.get(&contact.id).unwrap();
        assert!(updated.activity.last_sent_automation_email_at.is_some());
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_send_email_skips_when_template_deleted() {
        let (contacts, _, _, contact) = stores();
        let executor = SendEmailExecutor {
            contacts,
            directory: Arc::new(ChannelDirectory::new()),
            mailer: capture_mailer(),
            attribution: memory_kv(),
        };
        let step = step_with(
            StepKind::ActionSendEmail,
            serde_json::json!({
                "template_id": Uuid::new_v4(),
                "sender_identity_id": Uuid::new_v4(),
            }),
        );
        assert!(matches!(
            executor.run(&step, &contact).unwrap(),
            StepRun::Skipped { .. }
        ));
    }

    #[test]
    fn test_send_email_missing_config_is_fatal() {
        let (contacts, _, _, contact) = stores();
        let executor = SendEmailExecutor {
            contacts,
            directory: Arc::new(ChannelDirectory::new()),
            mailer: capture_mailer(),
            attribution: memory_kv(),
        };
        let step = step_with(StepKind::ActionSendEmail, serde_json::json!({}));
        assert!(matches!(
            executor.run(&step, &contact).unwrap_err(),
            SendcraftError::Config(_)
        ));
    }
}
