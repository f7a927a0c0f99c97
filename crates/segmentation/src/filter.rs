//! Declarative audience filter language: nested boolean groups of field
//! conditions. Segments, broadcast audiences, and automation rules all
//! store this structure and compile it on demand.

use serde::{Deserialize, Serialize};

/// Boolean combinator for a group's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOperator {
    And,
    Or,
}

/// A filter is either a composite of sub-groups or a leaf of conditions,
/// never both. Conditions within a leaf combine with the leaf operator;
/// leaf results combine with the enclosing composite operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterGroup {
    Composite {
        operator: GroupOperator,
        groups: Vec<FilterGroup>,
    },
    Leaf {
        operator: GroupOperator,
        conditions: Vec<Condition>,
    },
}

impl FilterGroup {
    /// Leaf requiring every condition to hold.
    pub fn all(conditions: Vec<Condition>) -> Self {
        FilterGroup::Leaf {
            operator: GroupOperator::And,
            conditions,
        }
    }

    /// Leaf requiring at least one condition to hold.
    pub fn any(conditions: Vec<Condition>) -> Self {
        FilterGroup::Leaf {
            operator: GroupOperator::Or,
            conditions,
        }
    }

    /// Composite requiring every sub-group to match.
    pub fn all_of(groups: Vec<FilterGroup>) -> Self {
        FilterGroup::Composite {
            operator: GroupOperator::And,
            groups,
        }
    }

    /// Composite requiring at least one sub-group to match.
    pub fn any_of(groups: Vec<FilterGroup>) -> Self {
        FilterGroup::Composite {
            operator: GroupOperator::Or,
            groups,
        }
    }
}

/// Comparison applied by a condition. Text fields accept the full set;
/// tag and activity fields reinterpret a subset (see the condition
/// evaluators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperation {
    Eq,
    StartsWith,
    EndsWith,
    Gte,
    Lte,
    Contains,
    NotContains,
}

/// A single (field, operation, value) comparison. The field name selects
/// which evaluator domain handles it: direct contact attributes,
/// `properties.<key>`, `tags`, or an activity timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operation: ConditionOperation,
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operation: ConditionOperation,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operation,
            value: value.into(),
        }
    }
}
