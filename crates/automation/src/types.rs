use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sendcraft_segmentation::FilterGroup;

/// Branch discriminator on direct children of an if/else rule step.
pub const YES_BRANCH: u8 = 1;
pub const NO_BRANCH: u8 = 0;

/// A named workflow attached to an audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub audience_id: Uuid,
    pub name: String,
    pub status: AutomationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of an automation. Only `Active` automations enqueue
/// successor step jobs; already-queued jobs still run after a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Draft,
    Active,
    Paused,
}

/// Coarse category of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Trigger,
    Rule,
    Action,
    End,
}

/// Concrete step subtype; the executor registry is keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    TriggerContactSubscribed,
    RuleIfElse,
    ActionSendEmail,
    ActionAddTag,
    ActionRemoveTag,
    /// Synthesized NO-branch action, a no-op until configured.
    ActionPlaceholder,
    End,
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::TriggerContactSubscribed => StepType::Trigger,
            StepKind::RuleIfElse => StepType::Rule,
            StepKind::ActionSendEmail
            | StepKind::ActionAddTag
            | StepKind::ActionRemoveTag
            | StepKind::ActionPlaceholder => StepType::Action,
            StepKind::End => StepType::End,
        }
    }
}

/// One node of an automation's step tree. Steps link to their parent;
/// `branch_index` is set only on direct children of a `RuleIfElse` step
/// (1 = YES, 0 = NO). Exactly one step per automation has no parent:
/// the trigger root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStep {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub step_type: StepType,
    pub kind: StepKind,
    pub configuration: serde_json::Value,
    pub parent_id: Option<Uuid>,
    pub branch_index: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl AutomationStep {
    pub fn new(
        automation_id: Uuid,
        kind: StepKind,
        configuration: serde_json::Value,
        parent_id: Option<Uuid>,
        branch_index: Option<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            automation_id,
            step_type: kind.step_type(),
            kind,
            configuration,
            parent_id,
            branch_index,
            created_at: Utc::now(),
        }
    }
}

/// Completion status of a (contact, step) pair. The ledger is
/// append-only; rows are never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
}

/// Audit-trail row recording that a contact passed through a step.
/// Doubles as the idempotency signal under at-least-once redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactAutomationStep {
    pub contact_id: Uuid,
    pub automation_step_id: Uuid,
    pub status: CompletionStatus,
    pub completed_at: DateTime<Utc>,
}

/// Payload of one queued work unit: run this step for this contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepJob {
    pub automation_step_id: Uuid,
    pub contact_id: Uuid,
}

/// Configuration payload of an `ActionSendEmail` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailConfig {
    pub template_id: Uuid,
    pub sender_identity_id: Uuid,
}

/// Configuration payload of `ActionAddTag` / `ActionRemoveTag` steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagActionConfig {
    pub tag_id: Uuid,
}

/// Configuration payload of a `RuleIfElse` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub filter: FilterGroup,
}
