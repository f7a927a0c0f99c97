//! Compiled predicate tree: the evaluable form a filter group is lowered
//! into. Evaluation is pure with respect to the contact, so segment
//! queries and automation rule branching agree on identical inputs.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use sendcraft_core::types::{ActivityKind, Contact, PropertyValue};

/// Direct text attributes of a contact addressable by filter conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Email,
    FirstName,
    LastName,
    LastTrackedActivityType,
    LastTrackedActivityDetail,
}

impl TextField {
    fn value_of<'a>(&self, contact: &'a Contact) -> Option<&'a str> {
        match self {
            TextField::Email => Some(contact.email.as_str()),
            TextField::FirstName => contact.first_name.as_deref(),
            TextField::LastName => contact.last_name.as_deref(),
            TextField::LastTrackedActivityType => contact.last_tracked_activity_type.as_deref(),
            TextField::LastTrackedActivityDetail => {
                contact.last_tracked_activity_detail.as_deref()
            }
        }
    }
}

/// One compiled text comparison. All matches are case-sensitive;
/// `Gte`/`Lte` order lexicographically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTest {
    Eq(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    NotContains(String),
    Gte(String),
    Lte(String),
}

impl TextTest {
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            TextTest::Eq(expected) => actual == expected,
            TextTest::StartsWith(expected) => actual.starts_with(expected),
            TextTest::EndsWith(expected) => actual.ends_with(expected),
            TextTest::Contains(expected) => actual.contains(expected),
            TextTest::NotContains(expected) => !actual.contains(expected),
            TextTest::Gte(expected) => actual >= expected.as_str(),
            TextTest::Lte(expected) => actual <= expected.as_str(),
        }
    }

    /// Whether an absent value satisfies this test. Only negated
    /// containment treats a missing field as a match.
    fn matches_absent(&self) -> bool {
        matches!(self, TextTest::NotContains(_))
    }
}

/// One compiled ordering comparison over dates or floats.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTest<T> {
    pub op: OrderOp,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    Eq,
    Gte,
    Lte,
}

impl<T: PartialOrd> OrderTest<T> {
    pub fn matches(&self, actual: &T) -> bool {
        match self.op {
            OrderOp::Eq => actual == &self.value,
            OrderOp::Gte => actual >= &self.value,
            OrderOp::Lte => actual <= &self.value,
        }
    }
}

/// Evaluable boolean condition over a single contact, produced by the
/// filter compiler. `Everything`/`Nothing` make the empty-group policy
/// and the unknown-property policy explicit instead of delegating them
/// to engine defaults.
#[derive(Debug, Clone)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Everything,
    Nothing,
    Text {
        field: TextField,
        test: TextTest,
    },
    TrackedActivityAt(OrderTest<DateTime<Utc>>),
    PropertyText {
        key: String,
        test: TextTest,
    },
    PropertyFloat {
        key: String,
        test: OrderTest<f64>,
    },
    PropertyBoolean {
        key: String,
        expected: bool,
    },
    PropertyDate {
        key: String,
        test: OrderTest<DateTime<Utc>>,
    },
    /// Contact carries at least one of the listed tags.
    HasAnyTag(Vec<Uuid>),
    /// Contact carries none of the listed tags.
    HasNoneOfTags(Vec<Uuid>),
    ActivityWithinDays {
        kind: ActivityKind,
        days: i64,
    },
    ActivityOlderThanDays {
        kind: ActivityKind,
        days: i64,
    },
    ActivityPresent(ActivityKind),
    ActivityAbsent(ActivityKind),
}

impl Predicate {
    pub fn matches(&self, contact: &Contact) -> bool {
        match self {
            Predicate::All(inner) => inner.iter().all(|p| p.matches(contact)),
            Predicate::Any(inner) => inner.iter().any(|p| p.matches(contact)),
            Predicate::Everything => true,
            Predicate::Nothing => false,
            Predicate::Text { field, test } => match field.value_of(contact) {
                Some(actual) => test.matches(actual),
                None => test.matches_absent(),
            },
            Predicate::TrackedActivityAt(test) => contact
                .last_tracked_activity_at
                .map_or(false, |at| test.matches(&at)),
            Predicate::PropertyText { key, test } => {
                match contact.properties.get(key) {
                    Some(PropertyValue::Text(actual)) => test.matches(actual),
                    // Missing or drifted to another kind: treated as absent.
                    _ => test.matches_absent(),
                }
            }
            Predicate::PropertyFloat { key, test } => match contact.properties.get(key) {
                Some(PropertyValue::Float(actual)) => test.matches(actual),
                _ => false,
            },
            Predicate::PropertyBoolean { key, expected } => match contact.properties.get(key) {
                Some(PropertyValue::Boolean(actual)) => actual == expected,
                _ => false,
            },
            Predicate::PropertyDate { key, test } => match contact.properties.get(key) {
                Some(PropertyValue::Date(actual)) => test.matches(actual),
                _ => false,
            },
            Predicate::HasAnyTag(tag_ids) => tag_ids.iter().any(|id| contact.tags.contains(id)),
            Predicate::HasNoneOfTags(tag_ids) => {
                !tag_ids.iter().any(|id| contact.tags.contains(id))
            }
            Predicate::ActivityWithinDays { kind, days } => {
                let cutoff = Utc::now() - Duration::days(*days);
                contact.activity.get(*kind).map_or(false, |at| at >= cutoff)
            }
            Predicate::ActivityOlderThanDays { kind, days } => {
                let cutoff = Utc::now() - Duration::days(*days);
                contact.activity.get(*kind).map_or(false, |at| at <= cutoff)
            }
            Predicate::ActivityPresent(kind) => contact.activity.get(*kind).is_some(),
            Predicate::ActivityAbsent(kind) => contact.activity.get(*kind).is_none(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn contact_with_email(email: &str) -> Contact {
        Contact::new(Uuid::new_v4(), email)
    }

    #[test]
    fn test_text_test_anchoring() {
        assert!(TextTest::StartsWith("ali".into()).matches("alice"));
        assert!(!TextTest::StartsWith("lic".into()).matches("alice"));
        assert!(TextTest::EndsWith("ice".into()).matches("alice"));
        assert!(TextTest::Contains("lic".into()).matches("alice"));
        assert!(TextTest::NotContains("bob".into()).matches("alice"));
        // Case-sensitive
        assert!(!TextTest::Contains("ALICE".into()).matches("alice"));
    }

    #[test]
    fn test_lexicographic_ordering() {
        assert!(TextTest::Gte("b".into()).matches("c"));
        assert!(TextTest::Gte("b".into()).matches("b"));
        assert!(!TextTest::Gte("b".into()).matches("a"));
        assert!(TextTest::Lte("b".into()).matches("a"));
    }

    #[test]
    fn test_absent_text_only_matches_not_contains() {
        let contact = contact_with_email("a@x.com");
        let not_contains = Predicate::Text {
            field: TextField::FirstName,
            test: TextTest::NotContains("z".into()),
        };
        let eq = Predicate::Text {
            field: TextField::FirstName,
            test: TextTest::Eq("Ann".into()),
        };
        assert!(not_contains.matches(&contact));
        assert!(!eq.matches(&contact));
    }

    #[test]
    fn test_tag_membership() {
        let tag = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut contact = contact_with_email("a@x.com");
        contact.tags.insert(tag);

        assert!(Predicate::HasAnyTag(vec![tag]).matches(&contact));
        assert!(!Predicate::HasAnyTag(vec![other]).matches(&contact));
        assert!(Predicate::HasNoneOfTags(vec![other]).matches(&contact));
        assert!(!Predicate::HasNoneOfTags(vec![tag, other]).matches(&contact));
    }

    #[test]
    fn test_activity_window() {
        let mut contact = contact_with_email("a@x.com");
        contact
            .activity
            .set(ActivityKind::OpenedBroadcastEmail, Utc::now() - Duration::days(10));

        let recent = Predicate::ActivityWithinDays {
            kind: ActivityKind::OpenedBroadcastEmail,
            days: 30,
        };
        let stale = Predicate::ActivityOlderThanDays {
            kind: ActivityKind::OpenedBroadcastEmail,
            days: 5,
        };
        let too_recent = Predicate::ActivityWithinDays {
            kind: ActivityKind::OpenedBroadcastEmail,
            days: 5,
        };
        assert!(recent.matches(&contact));
        assert!(stale.matches(&contact));
        assert!(!too_recent.matches(&contact));

        assert!(Predicate::ActivityPresent(ActivityKind::OpenedBroadcastEmail).matches(&contact));
        assert!(Predicate::ActivityAbsent(ActivityKind::ClickedAutomationEmailLink)
            .matches(&contact));
    }

    #[test]
    fn test_everything_nothing() {
        let contact = contact_with_email("a@x.com");
        assert!(Predicate::Everything.matches(&contact));
        assert!(!Predicate::Nothing.matches(&contact));
        assert!(Predicate::All(vec![]).matches(&contact));
        assert!(!Predicate::Any(vec![]).matches(&contact));
    }
}
