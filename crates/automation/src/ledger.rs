//! Completion ledger: append-only (contact, step) records. The unique
//! key doubles as the idempotency signal under at-least-once delivery.

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{CompletionStatus, ContactAutomationStep};

#[derive(Default)]
pub struct CompletionLedger {
    rows: DashMap<(Uuid, Uuid), ContactAutomationStep>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Record that a contact completed a step. Returns `false` when a
    /// row already existed; the original row and its timestamp are kept.
    pub fn record(&self, contact_id: Uuid, automation_step_id: Uuid) -> bool {
        let mut inserted = false;
        self.rows
            .entry((contact_id, automation_step_id))
            .or_insert_with(|| {
                inserted = true;
                ContactAutomationStep {
                    contact_id,
                    automation_step_id,
                    status: CompletionStatus::Completed,
                    completed_at: Utc::now(),
                }
            });
        inserted
    }

    pub fn is_completed(&self, contact_id: &Uuid, automation_step_id: &Uuid) -> bool {
        self.rows.contains_key(&(*contact_id, *automation_step_id))
    }

    /// All completion rows for a contact, oldest first.
    pub fn for_contact(&self, contact_id: &Uuid) -> Vec<ContactAutomationStep> {
        let mut rows: Vec<ContactAutomationStep> = self
            .rows
            .iter()
            .filter(|r| r.contact_id == *contact_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.completed_at);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_unique_per_contact_and_step() {
        let ledger = CompletionLedger::new();
        let contact = Uuid::new_v4();
        let step = Uuid::new_v4();

        assert!(ledger.record(contact, step));
        let first = ledger.for_contact(&contact)[0].completed_at;

        // Redelivery: no second row, original timestamp preserved.
        assert!(!ledger.record(contact, step));
        let rows = ledger.for_contact(&contact);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].completed_at, first);

        assert!(ledger.is_completed(&contact, &step));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_rows_are_scoped_per_contact() {
        let ledger = CompletionLedger::new();
        let step = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(ledger.record(a, step));
        assert!(ledger.record(b, step));
        assert_eq!(ledger.for_contact(&a).len(), 1);
        assert_eq!(ledger.len(), 2);
    }
}
