//! Workflow graph store: automations and their step trees. Steps are an
//! arena keyed by id with a parent index; splice operations mutate
//! several rows at once and run under a single write lock so an
//! automation is never observable with a dangling or duplicate parent
//! pointer.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use sendcraft_core::error::{SendcraftError, SendcraftResult};

use crate::types::{
    Automation, AutomationStatus, AutomationStep, StepKind, StepType, NO_BRANCH, YES_BRANCH,
};

/// Repository of automation definitions.
#[derive(Default)]
pub struct AutomationStore {
    automations: DashMap<Uuid, Automation>,
}

impl AutomationStore {
    pub fn new() -> Self {
        Self {
            automations: DashMap::new(),
        }
    }

    pub fn create(&self, audience_id: Uuid, name: impl Into<String>) -> Automation {
        let now = chrono::Utc::now();
        let automation = Automation {
            id: Uuid::new_v4(),
            audience_id,
            name: name.into(),
            status: AutomationStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        info!(automation_id = %automation.id, name = %automation.name, "Creating automation");
        self.automations.insert(automation.id, automation.clone());
        automation
    }

    pub fn get(&self, id: &Uuid) -> Option<Automation> {
        self.automations.get(id).map(|a| a.clone())
    }

    pub fn set_status(&self, id: &Uuid, status: AutomationStatus) -> SendcraftResult<()> {
        let mut automation = self
            .automations
            .get_mut(id)
            .ok_or_else(|| SendcraftError::NotFound(format!("automation {id}")))?;
        info!(automation_id = %id, ?status, "Updating automation status");
        automation.status = status;
        automation.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.automations
            .get(id)
            .map_or(false, |a| a.status == AutomationStatus::Active)
    }
}

/// Step ids created by seeding a trigger.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSteps {
    pub trigger_step_id: Uuid,
    pub end_step_id: Uuid,
}

/// Step ids created by splicing an if/else rule.
#[derive(Debug, Clone, Copy)]
pub struct IfElseSteps {
    pub rule_step_id: Uuid,
    /// Synthesized placeholder action on the NO branch.
    pub no_action_id: Uuid,
    /// END step closing the NO branch.
    pub no_end_id: Uuid,
}

#[derive(Default)]
struct StepArena {
    steps: HashMap<Uuid, AutomationStep>,
    /// parent step id to child step ids, insertion-ordered.
    children: HashMap<Uuid, Vec<Uuid>>,
    /// automation id to its trigger root.
    roots: HashMap<Uuid, Uuid>,
}

impl StepArena {
    fn attach(&mut self, step: AutomationStep) -> Uuid {
        let id = step.id;
        if let Some(parent_id) = step.parent_id {
            self.children.entry(parent_id).or_default().push(id);
        }
        self.steps.insert(id, step);
        id
    }

    fn repoint(&mut self, child_id: Uuid, new_parent_id: Uuid, branch_index: Option<u8>) {
        let Some(child) = self.steps.get_mut(&child_id) else {
            return;
        };
        let old_parent = child.parent_id;
        child.parent_id = Some(new_parent_id);
        child.branch_index = branch_index;

        if let Some(old_parent) = old_parent {
            if let Some(siblings) = self.children.get_mut(&old_parent) {
                siblings.retain(|id| *id != child_id);
            }
        }
        self.children.entry(new_parent_id).or_default().push(child_id);
    }
}

/// Arena of automation steps with parent-pointer tree structure.
#[derive(Default)]
pub struct AutomationStepStore {
    arena: RwLock<StepArena>,
}

impl AutomationStepStore {
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(StepArena::default()),
        }
    }

    /// Seed an automation with its trigger root and a single END child.
    pub fn create_trigger(
        &self,
        automation_id: Uuid,
        kind: StepKind,
        configuration: serde_json::Value,
    ) -> SendcraftResult<TriggerSteps> {
        if kind.step_type() != StepType::Trigger {
            return Err(SendcraftError::Config(format!(
                "step kind {kind:?} is not a trigger"
            )));
        }

        let mut arena = self.arena.write();
        if arena.roots.contains_key(&automation_id) {
            return Err(SendcraftError::Config(format!(
                "automation {automation_id} already has a trigger"
            )));
        }

        let trigger = AutomationStep::new(automation_id, kind, configuration, None, None);
        let end = AutomationStep::new(
            automation_id,
            StepKind::End,
            serde_json::json!({}),
            Some(trigger.id),
            None,
        );

        let trigger_step_id = arena.attach(trigger);
        let end_step_id = arena.attach(end);
        arena.roots.insert(automation_id, trigger_step_id);

        info!(%automation_id, %trigger_step_id, "Created automation trigger");
        Ok(TriggerSteps {
            trigger_step_id,
            end_step_id,
        })
    }

    /// Splice a new action step between `insert_before` and its parent.
    /// The new step adopts the target's parent pointer and branch
    /// discriminator; the target is re-pointed underneath it.
    pub fn create_step(
        &self,
        automation_id: Uuid,
        kind: StepKind,
        configuration: serde_json::Value,
        insert_before: Uuid,
    ) -> SendcraftResult<Uuid> {
        if kind.step_type() != StepType::Action {
            return Err(SendcraftError::Config(format!(
                "step kind {kind:?} cannot be spliced as an action; rules use create_if_else_step"
            )));
        }

        let mut arena = self.arena.write();
        let (parent_id, branch_index) = splice_target(&arena, automation_id, insert_before)?;

        let step = AutomationStep::new(
            automation_id,
            kind,
            configuration,
            Some(parent_id),
            branch_index,
        );
        let step_id = arena.attach(step);
        arena.repoint(insert_before, step_id, None);

        info!(%automation_id, %step_id, ?kind, "Spliced automation step");
        Ok(step_id)
    }

    /// Splice an if/else rule in place of `insert_before`. The target
    /// becomes the YES child; a NO branch is synthesized as one
    /// placeholder action followed by an END step. The whole mutation is
    /// atomic under the arena's write lock.
    pub fn create_if_else_step(
        &self,
        automation_id: Uuid,
        configuration: serde_json::Value,
        insert_before: Uuid,
    ) -> SendcraftResult<IfElseSteps> {
        let mut arena = self.arena.write();
        let (parent_id, branch_index) = splice_target(&arena, automation_id, insert_before)?;

        let rule = AutomationStep::new(
            automation_id,
            StepKind::RuleIfElse,
            configuration,
            Some(parent_id),
            branch_index,
        );
        let rule_step_id = arena.attach(rule);
        arena.repoint(insert_before, rule_step_id, Some(YES_BRANCH));

        let no_action = AutomationStep::new(
            automation_id,
            StepKind::ActionPlaceholder,
            serde_json::json!({}),
            Some(rule_step_id),
            Some(NO_BRANCH),
        );
        let no_action_id = arena.attach(no_action);

        let no_end = AutomationStep::new(
            automation_id,
            StepKind::End,
            serde_json::json!({}),
            Some(no_action_id),
            None,
        );
        let no_end_id = arena.attach(no_end);

        info!(%automation_id, %rule_step_id, "Spliced if/else rule step");
        Ok(IfElseSteps {
            rule_step_id,
            no_action_id,
            no_end_id,
        })
    }

    pub fn update_configuration(
        &self,
        step_id: &Uuid,
        configuration: serde_json::Value,
    ) -> SendcraftResult<()> {
        let mut arena = self.arena.write();
        let step = arena
            .steps
            .get_mut(step_id)
            .ok_or_else(|| SendcraftError::NotFound(format!("automation step {step_id}")))?;
        step.configuration = configuration;
        Ok(())
    }

    pub fn find_by_id(&self, step_id: &Uuid) -> Option<AutomationStep> {
        self.arena.read().steps.get(step_id).cloned()
    }

    pub fn find_children(&self, parent_id: &Uuid) -> Vec<AutomationStep> {
        let arena = self.arena.read();
        arena
            .children
            .get(parent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| arena.steps.get(id).cloned())
            .collect()
    }

    /// The sole non-branch child of a step, if any. Non-rule steps have
    /// at most one.
    pub fn find_child(&self, parent_id: &Uuid) -> Option<AutomationStep> {
        self.find_children(parent_id)
            .into_iter()
            .find(|s| s.branch_index.is_none())
    }

    /// The YES or NO child of a rule step, if present.
    pub fn find_branch(&self, rule_id: &Uuid, branch_index: u8) -> Option<AutomationStep> {
        self.find_children(rule_id)
            .into_iter()
            .find(|s| s.branch_index == Some(branch_index))
    }

    pub fn find_root(&self, automation_id: &Uuid) -> Option<AutomationStep> {
        let arena = self.arena.read();
        arena
            .roots
            .get(automation_id)
            .and_then(|id| arena.steps.get(id).cloned())
    }

    pub fn steps_for_automation(&self, automation_id: &Uuid) -> Vec<AutomationStep> {
        let mut steps: Vec<AutomationStep> = self
            .arena
            .read()
            .steps
            .values()
            .filter(|s| s.automation_id == *automation_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.created_at);
        steps
    }

    pub fn len(&self) -> usize {
        self.arena.read().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.read().steps.is_empty()
    }

    /// Test hook: attach a raw step, bypassing splice validation, to set
    /// up shapes the authoring API cannot produce (e.g. a rule with a
    /// missing branch).
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, step: AutomationStep) -> Uuid {
        self.arena.write().attach(step)
    }
}

/// Validate a splice target and return its (parent, branch) slot.
fn splice_target(
    arena: &StepArena,
    automation_id: Uuid,
    insert_before: Uuid,
) -> SendcraftResult<(Uuid, Option<u8>)> {
    let target = arena
        .steps
        .get(&insert_before)
        .ok_or_else(|| SendcraftError::NotFound(format!("automation step {insert_before}")))?;
    if target.automation_id != automation_id {
        return Err(SendcraftError::Config(format!(
            "step {insert_before} belongs to a different automation"
        )));
    }
    let parent_id = target.parent_id.ok_or_else(|| {
        SendcraftError::Config("cannot insert a step before the trigger root".to_string())
    })?;
    Ok((parent_id, target.branch_index))
}
