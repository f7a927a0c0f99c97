use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of an audience-defined custom property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Boolean,
    Date,
    Text,
    Float,
}

/// A concrete custom-property value stored on a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PropertyValue {
    Boolean(bool),
    Date(DateTime<Utc>),
    Text(String),
    Float(f64),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Boolean(_) => PropertyKind::Boolean,
            PropertyValue::Date(_) => PropertyKind::Date,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Float(_) => PropertyKind::Float,
        }
    }
}

/// A tenant-scoped collection of contacts. Carries the custom-property
/// type registry that filter compilation consults for `properties.<key>`
/// conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    pub id: Uuid,
    pub name: String,
    /// Property key to declared type, defined per audience.
    #[serde(default)]
    pub properties: HashMap<String, PropertyKind>,
    pub created_at: DateTime<Utc>,
}

impl Audience {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            properties: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Declared type of a custom property, or `None` for unknown keys.
    pub fn property_kind(&self, key: &str) -> Option<PropertyKind> {
        self.properties.get(key).copied()
    }
}

/// Which engagement timestamp an email activity event updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    SentBroadcastEmail,
    SentAutomationEmail,
    OpenedBroadcastEmail,
    OpenedAutomationEmail,
    ClickedBroadcastEmailLink,
    ClickedAutomationEmailLink,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::SentBroadcastEmail => "sent_broadcast_email",
            ActivityKind::SentAutomationEmail => "sent_automation_email",
            ActivityKind::OpenedBroadcastEmail => "opened_broadcast_email",
            ActivityKind::OpenedAutomationEmail => "opened_automation_email",
            ActivityKind::ClickedBroadcastEmailLink => "clicked_broadcast_email_link",
            ActivityKind::ClickedAutomationEmailLink => "clicked_automation_email_link",
        }
    }
}

/// Cached per-contact email engagement timestamps, maintained by the
/// event-processing pipeline and read by activity filter conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactActivity {
    pub last_sent_broadcast_email_at: Option<DateTime<Utc>>,
    pub last_sent_automation_email_at: Option<DateTime<Utc>>,
    pub last_opened_broadcast_email_at: Option<DateTime<Utc>>,
    pub last_opened_automation_email_at: Option<DateTime<Utc>>,
    pub last_clicked_broadcast_email_link_at: Option<DateTime<Utc>>,
    pub last_clicked_automation_email_link_at: Option<DateTime<Utc>>,
}

impl ContactActivity {
    pub fn get(&self, kind: ActivityKind) -> Option<DateTime<Utc>> {
        match kind {
            ActivityKind::SentBroadcastEmail => self.last_sent_broadcast_email_at,
            ActivityKind::SentAutomationEmail => self.last_sent_automation_email_at,
            ActivityKind::OpenedBroadcastEmail => self.last_opened_broadcast_email_at,
            ActivityKind::OpenedAutomationEmail => self.last_opened_automation_email_at,
            ActivityKind::ClickedBroadcastEmailLink => self.last_clicked_broadcast_email_link_at,
            ActivityKind::ClickedAutomationEmailLink => {
                self.last_clicked_automation_email_link_at
            }
        }
    }

    pub fn set(&mut self, kind: ActivityKind, at: DateTime<Utc>) {
        let slot = match kind {
            ActivityKind::SentBroadcastEmail => &mut self.last_sent_broadcast_email_at,
            ActivityKind::SentAutomationEmail => &mut self.last_sent_automation_email_at,
            ActivityKind::OpenedBroadcastEmail => &mut self.last_opened_broadcast_email_at,
            ActivityKind::OpenedAutomationEmail => &mut self.last_opened_automation_email_at,
            ActivityKind::ClickedBroadcastEmailLink => {
                &mut self.last_clicked_broadcast_email_link_at
            }
            ActivityKind::ClickedAutomationEmailLink => {
                &mut self.last_clicked_automation_email_link_at
            }
        };
        *slot = Some(at);
    }
}

/// A subscriber record. Belongs to exactly one audience; owns its tag
/// memberships, typed custom properties, and cached activity timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub audience_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_tracked_activity_at: Option<DateTime<Utc>>,
    pub last_tracked_activity_type: Option<String>,
    pub last_tracked_activity_detail: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
    #[serde(default)]
    pub tags: HashSet<Uuid>,
    #[serde(default)]
    pub activity: ContactActivity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(audience_id: Uuid, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            audience_id,
            email: email.into(),
            first_name: None,
            last_name: None,
            last_tracked_activity_at: None,
            last_tracked_activity_type: None,
            last_tracked_activity_detail: None,
            properties: HashMap::new(),
            tags: HashSet::new(),
            activity: ContactActivity::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_tag(&self, tag_id: &Uuid) -> bool {
        self.tags.contains(tag_id)
    }
}

/// A label contacts can carry; membership is many-to-many within an audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub audience_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(audience_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            audience_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
