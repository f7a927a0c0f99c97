//! Contact, audience, and tag repositories. DashMap-backed row stores;
//! per-contact mutations (tag membership, property upserts, activity
//! stamps) happen under the row's entry lock so concurrent automation
//! steps touching the same contact stay consistent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use sendcraft_core::types::{ActivityKind, Audience, Contact, PropertyKind, PropertyValue, Tag};
use sendcraft_segmentation::Predicate;

/// Repository of audiences and their custom-property registries.
#[derive(Default)]
pub struct AudienceStore {
    audiences: DashMap<Uuid, Audience>,
}

impl AudienceStore {
    pub fn new() -> Self {
        Self {
            audiences: DashMap::new(),
        }
    }

    pub fn create(&self, name: impl Into<String>) -> Audience {
        let audience = Audience::new(name);
        info!(audience_id = %audience.id, name = %audience.name, "Creating audience");
        self.audiences.insert(audience.id, audience.clone());
        audience
    }

    pub fn get(&self, id: &Uuid) -> Option<Audience> {
        self.audiences.get(id).map(|a| a.clone())
    }

    pub fn list(&self) -> Vec<Audience> {
        self.audiences.iter().map(|a| a.value().clone()).collect()
    }

    /// Declare or redeclare a custom property on the audience's schema.
    pub fn define_property(&self, audience_id: &Uuid, key: impl Into<String>, kind: PropertyKind) {
        if let Some(mut audience) = self.audiences.get_mut(audience_id) {
            audience.properties.insert(key.into(), kind);
        }
    }
}

/// Repository of tags, scoped per audience.
#[derive(Default)]
pub struct TagStore {
    tags: DashMap<Uuid, Tag>,
}

impl TagStore {
    pub fn new() -> Self {
        Self {
            tags: DashMap::new(),
        }
    }

    pub fn create(&self, audience_id: Uuid, name: impl Into<String>) -> Tag {
        let tag = Tag::new(audience_id, name);
        self.tags.insert(tag.id, tag.clone());
        tag
    }

    pub fn get(&self, id: &Uuid) -> Option<Tag> {
        self.tags.get(id).map(|t| t.clone())
    }

    pub fn list_for_audience(&self, audience_id: &Uuid) -> Vec<Tag> {
        self.tags
            .iter()
            .filter(|t| t.audience_id == *audience_id)
            .map(|t| t.value().clone())
            .collect()
    }
}

/// One page of a predicate-filtered contact query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    /// Id of the last returned contact when more rows exist; feed back
    /// as the cursor of the next query.
    pub next_cursor: Option<Uuid>,
}

/// Repository of contact rows.
#[derive(Default)]
pub struct ContactStore {
    contacts: DashMap<Uuid, Contact>,
}

impl ContactStore {
    pub fn new() -> Self {
        Self {
            contacts: DashMap::new(),
        }
    }

    pub fn insert(&self, contact: Contact) -> Uuid {
        let id = contact.id;
        self.contacts.insert(id, contact);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Contact> {
        self.contacts.get(id).map(|c| c.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Contact> {
        self.contacts.remove(id).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn list_for_audience(&self, audience_id: &Uuid) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| c.audience_id == *audience_id)
            .map(|c| c.value().clone())
            .collect();
        contacts.sort_by_key(|c| c.id);
        contacts
    }

    /// Attach a tag. Returns whether membership changed; re-adding an
    /// existing tag is a no-op, which keeps the operation safe under
    /// at-least-once job redelivery.
    pub fn add_tag(&self, contact_id: &Uuid, tag_id: Uuid) -> bool {
        match self.contacts.get_mut(contact_id) {
            Some(mut contact) => {
                let changed = contact.tags.insert(tag_id);
                if changed {
                    contact.updated_at = Utc::now();
                }
                changed
            }
            None => false,
        }
    }

    /// Detach a tag. Returns whether membership changed.
    pub fn remove_tag(&self, contact_id: &Uuid, tag_id: &Uuid) -> bool {
        match self.contacts.get_mut(contact_id) {
            Some(mut contact) => {
                let changed = contact.tags.remove(tag_id);
                if changed {
                    contact.updated_at = Utc::now();
                }
                changed
            }
            None => false,
        }
    }

    /// Upsert one typed custom property on a contact.
    pub fn set_property(&self, contact_id: &Uuid, key: impl Into<String>, value: PropertyValue) {
        if let Some(mut contact) = self.contacts.get_mut(contact_id) {
            contact.properties.insert(key.into(), value);
            contact.updated_at = Utc::now();
        }
    }

    /// Stamp an engagement timestamp and the contact's tracked-activity
    /// summary fields. Called by the event-processing pipeline and by
    /// the send-email executor.
    pub fn record_activity(&self, contact_id: &Uuid, kind: ActivityKind, at: DateTime<Utc>) {
        if let Some(mut contact) = self.contacts.get_mut(contact_id) {
            contact.activity.set(kind, at);
            contact.last_tracked_activity_at = Some(at);
            contact.last_tracked_activity_type = Some(kind.as_str().to_string());
            contact.updated_at = at;
        }
    }

    /// Predicate-filtered page over an audience's contacts, ascending by
    /// contact id. Fetches `page_size + 1` matches and trims, so
    /// `next_cursor` is only set when another page exists.
    pub fn query(
        &self,
        audience_id: &Uuid,
        predicate: &Predicate,
        cursor: Option<Uuid>,
        page_size: usize,
    ) -> ContactPage {
        let mut matches: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| c.audience_id == *audience_id)
            .filter(|c| cursor.map_or(true, |after| c.id > after))
            .filter(|c| predicate.matches(c))
            .map(|c| c.value().clone())
            .collect();
        matches.sort_by_key(|c| c.id);
        matches.truncate(page_size + 1);

        let next_cursor = if matches.len() > page_size {
            matches.truncate(page_size);
            matches.last().map(|c| c.id)
        } else {
            None
        };

        ContactPage {
            contacts: matches,
            next_cursor,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sendcraft_segmentation::{Condition, ConditionOperation, FilterCompiler, FilterGroup};

    fn seeded_store() -> (AudienceStore, ContactStore, Audience) {
        let audiences = AudienceStore::new();
        let contacts = ContactStore::new();
        let audience = audiences.create("Newsletter");
        (audiences, contacts, audience)
    }

    #[test]
    fn test_tag_round_trip() {
        let (_, contacts, audience) = seeded_store();
        let tag_id = Uuid::new_v4();

        let contact = Contact::new(audience.id, "c@x.com");
        let contact_id = contacts.insert(contact);

        let filter = FilterGroup::all(vec![Condition::new(
            "tags",
            ConditionOperation::Eq,
            tag_id.to_string(),
        )]);
        let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();

        assert!(!predicate.matches(&contacts.get(&contact_id).unwrap()));

        assert!(contacts.add_tag(&contact_id, tag_id));
        assert!(predicate.matches(&contacts.get(&contact_id).unwrap()));

        assert!(contacts.remove_tag(&contact_id, &tag_id));
        assert!(!predicate.matches(&contacts.get(&contact_id).unwrap()));
    }

    #[test]
    fn test_tag_mutations_are_idempotent() {
        let (_, contacts, audience) = seeded_store();
        let tag_id = Uuid::new_v4();
        let contact_id = contacts.insert(Contact::new(audience.id, "c@x.com"));

        assert!(contacts.add_tag(&contact_id, tag_id));
        assert!(!contacts.add_tag(&contact_id, tag_id));
        assert_eq!(contacts.get(&contact_id).unwrap().tags.len(), 1);

        assert!(contacts.remove_tag(&contact_id, &tag_id));
        assert!(!contacts.remove_tag(&contact_id, &tag_id));
    }

    #[test]
    fn test_record_activity_updates_summary_fields() {
        let (_, contacts, audience) = seeded_store();
        let contact_id = contacts.insert(Contact::new(audience.id, "c@x.com"));
        let at = Utc::now();

        contacts.record_activity(&contact_id, ActivityKind::OpenedAutomationEmail, at);

        let contact = contacts.get(&contact_id).unwrap();
        assert_eq!(contact.activity.last_opened_automation_email_at, Some(at));
        assert_eq!(contact.last_tracked_activity_at, Some(at));
        assert_eq!(
            contact.last_tracked_activity_type.as_deref(),
            Some("opened_automation_email")
        );
    }

    #[test]
    fn test_query_paginates_by_ascending_id() {
        let (_, contacts, audience) = seeded_store();
        for i in 0..5 {
            contacts.insert(Contact::new(audience.id, format!("c{i}@x.com")));
        }

        let everyone = FilterCompiler::new()
            .compile(&FilterGroup::all(vec![]), &audience)
            .unwrap();

        let first = contacts.query(&audience.id, &everyone, None, 2);
        assert_eq!(first.contacts.len(), 2);
        let cursor = first.next_cursor.expect("more pages expected");
        assert_eq!(cursor, first.contacts[1].id);

        let second = contacts.query(&audience.id, &everyone, Some(cursor), 2);
        assert_eq!(second.contacts.len(), 2);
        assert!(second.contacts[0].id > cursor);

        let third = contacts.query(&audience.id, &everyone, second.next_cursor, 2);
        assert_eq!(third.contacts.len(), 1);
        assert!(third.next_cursor.is_none());

        // Pages are disjoint and ascending across the whole scan.
        let mut seen: Vec<Uuid> = first
            .contacts
            .iter()
            .chain(&second.contacts)
            .chain(&third.contacts)
            .map(|c| c.id)
            .collect();
        let mut sorted = seen.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(seen.len(), 5);
        seen.sort();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn test_query_applies_predicate() {
        let (_, contacts, audience) = seeded_store();
        contacts.insert(Contact::new(audience.id, "alice@x.com"));
        contacts.insert(Contact::new(audience.id, "bob@x.com"));

        let filter = FilterGroup::all(vec![Condition::new(
            "email",
            ConditionOperation::StartsWith,
            "alice",
        )]);
        let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();

        let page = contacts.query(&audience.id, &predicate, None, 10);
        assert_eq!(page.contacts.len(), 1);
        assert_eq!(page.contacts[0].email, "alice@x.com");
    }
}
