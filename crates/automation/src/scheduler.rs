//! Workflow scheduler: runs one (step, contact) work unit per dequeue,
//! records completion, and enqueues the successor. Enqueueing is the
//! only continuation mechanism; the engine never walks multiple steps
//! in-process, so each transition keeps the queue's failure and retry
//! semantics.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use sendcraft_contacts::{AudienceStore, ContactStore};
use sendcraft_core::error::{SendcraftError, SendcraftResult};
use sendcraft_core::queue::JobQueue;
use sendcraft_core::types::Contact;
use sendcraft_segmentation::FilterCompiler;

use crate::executors::{ExecutorRegistry, StepRun};
use crate::graph::{AutomationStepStore, AutomationStore};
use crate::ledger::CompletionLedger;
use crate::types::{AutomationStep, RuleConfig, StepJob, StepType, NO_BRANCH, YES_BRANCH};

/// Default job name for step work units.
pub const STEP_JOB_NAME: &str = "automation.run_step";

/// How one work unit concluded. Only `Advanced`/`Branched` with a next
/// step id produce a successor job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step ran; successor enqueued when `next_step_id` is set.
    Advanced { next_step_id: Option<Uuid> },
    /// Rule evaluated; the matching branch was enqueued.
    Branched {
        matched: bool,
        next_step_id: Option<Uuid>,
    },
    /// Traversal stopped without error (missing branch, paused automation).
    Halted { reason: String },
    /// Soft-skip: referenced data disappeared between enqueue and run.
    Skipped { reason: String },
    /// An END step was reached.
    Finished,
}

/// Orchestrates step execution for dequeued work units.
pub struct StepScheduler {
    steps: Arc<AutomationStepStore>,
    automations: Arc<AutomationStore>,
    contacts: Arc<ContactStore>,
    audiences: Arc<AudienceStore>,
    registry: Arc<ExecutorRegistry>,
    ledger: Arc<CompletionLedger>,
    queue: Arc<dyn JobQueue>,
    compiler: FilterCompiler,
    job_name: String,
}

impl StepScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        steps: Arc<AutomationStepStore>,
        automations: Arc<AutomationStore>,
        contacts: Arc<ContactStore>,
        audiences: Arc<AudienceStore>,
        registry: Arc<ExecutorRegistry>,
        ledger: Arc<CompletionLedger>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            steps,
            automations,
            contacts,
            audiences,
            registry,
            ledger,
            queue,
            compiler: FilterCompiler::new(),
            job_name: STEP_JOB_NAME.to_string(),
        }
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Enqueue a (step, contact) work unit. Entry point for the
    /// trigger-matching process and for successor scheduling.
    pub fn enqueue_step(&self, automation_step_id: Uuid, contact_id: Uuid) -> SendcraftResult<()> {
        let payload = serde_json::to_value(StepJob {
            automation_step_id,
            contact_id,
        })?;
        self.queue.enqueue(&self.job_name, payload)
    }

    /// Run one dequeued work unit to completion.
    pub fn run_step(
        &self,
        automation_step_id: Uuid,
        contact_id: Uuid,
    ) -> SendcraftResult<StepOutcome> {
        let step = self.steps.find_by_id(&automation_step_id).ok_or_else(|| {
            SendcraftError::Config(format!("automation step {automation_step_id} does not exist"))
        })?;

        let Some(contact) = self.contacts.get(&contact_id) else {
            warn!(
                step_id = %automation_step_id,
                %contact_id,
                "Contact no longer exists, skipping step"
            );
            return Ok(StepOutcome::Skipped {
                reason: format!("contact {contact_id} no longer exists"),
            });
        };

        match step.step_type {
            StepType::Rule => self.run_rule(&step, &contact),
            StepType::End => {
                self.ledger.record(contact.id, step.id);
                info!(step_id = %step.id, contact_id = %contact.id, "Automation finished for contact");
                Ok(StepOutcome::Finished)
            }
            // Triggers carry no side effect of their own; the matching
            // process already fired, so they pass straight through.
            StepType::Trigger => self.advance(&step, &contact),
            StepType::Action => {
                let executor = self.registry.get(step.kind).ok_or_else(|| {
                    SendcraftError::Config(format!(
                        "no executor registered for step kind {:?}",
                        step.kind
                    ))
                })?;
                let run = executor.run(&step, &contact)?;
                if let StepRun::Skipped { reason } = &run {
                    info!(step_id = %step.id, contact_id = %contact.id, %reason, "Step soft-skipped");
                }
                self.advance(&step, &contact)
            }
        }
    }

    /// Record completion and enqueue the sole non-branch child, if any.
    fn advance(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepOutcome> {
        self.ledger.record(contact.id, step.id);
        match self.steps.find_child(&step.id) {
            Some(child) => {
                let next_step_id =
                    self.enqueue_successor(step.automation_id, child.id, contact.id)?;
                Ok(StepOutcome::Advanced { next_step_id })
            }
            None => Ok(StepOutcome::Advanced { next_step_id: None }),
        }
    }

    /// Evaluate an if/else rule for one contact and route to the YES or
    /// NO child. A missing expected branch halts traversal silently;
    /// exactly one branch is ever enqueued per evaluation.
    fn run_rule(&self, step: &AutomationStep, contact: &Contact) -> SendcraftResult<StepOutcome> {
        let config: RuleConfig =
            serde_json::from_value(step.configuration.clone()).map_err(|e| {
                SendcraftError::Config(format!(
                    "rule step {} has invalid configuration: {e}",
                    step.id
                ))
            })?;
        let audience = self.audiences.get(&contact.audience_id).ok_or_else(|| {
            SendcraftError::NotFound(format!(
                "audience {} for contact {}",
                contact.audience_id, contact.id
            ))
        })?;

        let predicate = self.compiler.compile(&config.filter, &audience)?;
        let matched = predicate.matches(contact);
        self.ledger.record(contact.id, step.id);

        let branch_index = if matched { YES_BRANCH } else { NO_BRANCH };
        match self.steps.find_branch(&step.id, branch_index) {
            Some(branch) => {
                let next_step_id =
                    self.enqueue_successor(step.automation_id, branch.id, contact.id)?;
                info!(
                    step_id = %step.id,
                    contact_id = %contact.id,
                    matched,
                    "Rule evaluated"
                );
                Ok(StepOutcome::Branched {
                    matched,
                    next_step_id,
                })
            }
            None => {
                info!(
                    step_id = %step.id,
                    contact_id = %contact.id,
                    matched,
                    "Rule branch absent, halting traversal"
                );
                Ok(StepOutcome::Halted {
                    reason: format!("branch {branch_index} absent on rule {}", step.id),
                })
            }
        }
    }

    /// Enqueue the next work unit unless the automation has been
    /// deactivated since. Returns the enqueued step id, if any.
    fn enqueue_successor(
        &self,
        automation_id: Uuid,
        next_step_id: Uuid,
        contact_id: Uuid,
    ) -> SendcraftResult<Option<Uuid>> {
        if !self.automations.is_active(&automation_id) {
            info!(%automation_id, %next_step_id, "Automation inactive, not enqueueing successor");
            return Ok(None);
        }
        self.enqueue_step(next_step_id, contact_id)?;
        Ok(Some(next_step_id))
    }
}
