//! Condition evaluators: lower a single (field, operation, value)
//! condition into a predicate for its field domain. Invalid
//! operation/value combinations are rejected here, at compile time, so
//! runtime evaluation can assume well-formed input.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sendcraft_core::error::{SendcraftError, SendcraftResult};
use sendcraft_core::types::{ActivityKind, Audience, PropertyKind};

use crate::filter::{Condition, ConditionOperation};
use crate::predicates::{OrderOp, OrderTest, Predicate, TextField, TextTest};

/// Prefix addressing audience-defined custom properties.
pub const PROPERTY_PREFIX: &str = "properties.";

/// Which evaluator a condition's field name routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDomain {
    Direct(DirectField),
    Property(String),
    Tags,
    Activity(ActivityKind),
}

/// Fields stored directly on the contact row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectField {
    Email,
    FirstName,
    LastName,
    LastTrackedActivityAt,
    LastTrackedActivityType,
    LastTrackedActivityDetail,
}

/// Resolve a condition's field name to its evaluator domain. Returns
/// `None` for names outside the filterable surface.
pub fn classify_field(field: &str) -> Option<FieldDomain> {
    if let Some(key) = field.strip_prefix(PROPERTY_PREFIX) {
        if key.is_empty() {
            return None;
        }
        return Some(FieldDomain::Property(key.to_string()));
    }

    let domain = match field {
        "email" => FieldDomain::Direct(DirectField::Email),
        "firstName" => FieldDomain::Direct(DirectField::FirstName),
        "lastName" => FieldDomain::Direct(DirectField::LastName),
        "lastTrackedActivityAt" => FieldDomain::Direct(DirectField::LastTrackedActivityAt),
        "lastTrackedActivityType" => FieldDomain::Direct(DirectField::LastTrackedActivityType),
        "lastTrackedActivityDetail" => FieldDomain::Direct(DirectField::LastTrackedActivityDetail),
        "tags" => FieldDomain::Tags,
        "lastSentBroadcastEmailAt" => FieldDomain::Activity(ActivityKind::SentBroadcastEmail),
        "lastSentAutomationEmailAt" => FieldDomain::Activity(ActivityKind::SentAutomationEmail),
        "lastOpenedBroadcastEmailAt" => FieldDomain::Activity(ActivityKind::OpenedBroadcastEmail),
        "lastOpenedAutomationEmailAt" => {
            FieldDomain::Activity(ActivityKind::OpenedAutomationEmail)
        }
        "lastClickedBroadcastEmailLinkAt" => {
            FieldDomain::Activity(ActivityKind::ClickedBroadcastEmailLink)
        }
        "lastClickedAutomationEmailLinkAt" => {
            FieldDomain::Activity(ActivityKind::ClickedAutomationEmailLink)
        }
        _ => return None,
    };
    Some(domain)
}

/// Lower one condition into a predicate, consulting the audience's
/// property-type registry for `properties.<key>` fields.
pub fn compile_condition(condition: &Condition, audience: &Audience) -> SendcraftResult<Predicate> {
    let domain = classify_field(&condition.field).ok_or_else(|| {
        SendcraftError::Validation(format!("unknown filter field `{}`", condition.field))
    })?;

    match domain {
        FieldDomain::Direct(field) => compile_direct(field, condition),
        FieldDomain::Property(key) => {
            compile_property(&key, audience.property_kind(&key), condition)
        }
        FieldDomain::Tags => compile_tags(condition),
        FieldDomain::Activity(kind) => compile_activity(kind, condition),
    }
}

fn compile_direct(field: DirectField, condition: &Condition) -> SendcraftResult<Predicate> {
    let text_field = match field {
        DirectField::Email => TextField::Email,
        DirectField::FirstName => TextField::FirstName,
        DirectField::LastName => TextField::LastName,
        DirectField::LastTrackedActivityType => TextField::LastTrackedActivityType,
        DirectField::LastTrackedActivityDetail => TextField::LastTrackedActivityDetail,
        DirectField::LastTrackedActivityAt => {
            let test = order_test_datetime(condition)?;
            return Ok(Predicate::TrackedActivityAt(test));
        }
    };
    let test = text_test(condition)?;
    Ok(Predicate::Text {
        field: text_field,
        test,
    })
}

fn compile_property(
    key: &str,
    kind: Option<PropertyKind>,
    condition: &Condition,
) -> SendcraftResult<Predicate> {
    let Some(kind) = kind else {
        // The property schema can change after a filter is saved; an
        // unknown key matches nothing rather than failing the filter.
        return Ok(Predicate::Nothing);
    };

    let predicate = match kind {
        PropertyKind::Text => Predicate::PropertyText {
            key: key.to_string(),
            test: text_test(condition)?,
        },
        PropertyKind::Float => Predicate::PropertyFloat {
            key: key.to_string(),
            test: order_test_float(condition)?,
        },
        PropertyKind::Boolean => {
            if condition.operation != ConditionOperation::Eq {
                return Err(invalid_operation(condition, "boolean property"));
            }
            Predicate::PropertyBoolean {
                key: key.to_string(),
                expected: expect_bool(condition)?,
            }
        }
        PropertyKind::Date => Predicate::PropertyDate {
            key: key.to_string(),
            test: order_test_datetime(condition)?,
        },
    };
    Ok(predicate)
}

fn compile_tags(condition: &Condition) -> SendcraftResult<Predicate> {
    let tag_ids = expect_tag_ids(condition)?;
    match condition.operation {
        ConditionOperation::Eq | ConditionOperation::Contains => Ok(Predicate::HasAnyTag(tag_ids)),
        ConditionOperation::NotContains => Ok(Predicate::HasNoneOfTags(tag_ids)),
        _ => Err(invalid_operation(condition, "tags")),
    }
}

fn compile_activity(kind: ActivityKind, condition: &Condition) -> SendcraftResult<Predicate> {
    match condition.operation {
        ConditionOperation::Gte => Ok(Predicate::ActivityWithinDays {
            kind,
            days: expect_days(condition)?,
        }),
        ConditionOperation::Lte => Ok(Predicate::ActivityOlderThanDays {
            kind,
            days: expect_days(condition)?,
        }),
        ConditionOperation::Eq if condition.value.is_null() => {
            Ok(Predicate::ActivityAbsent(kind))
        }
        ConditionOperation::NotContains if condition.value.is_null() => {
            Ok(Predicate::ActivityPresent(kind))
        }
        _ => Err(invalid_operation(condition, "activity timestamp")),
    }
}

// ------------------------------------------------------------------
// Value extraction
// ------------------------------------------------------------------

fn text_test(condition: &Condition) -> SendcraftResult<TextTest> {
    let value = expect_text(condition)?;
    let test = match condition.operation {
        ConditionOperation::Eq => TextTest::Eq(value),
        ConditionOperation::StartsWith => TextTest::StartsWith(value),
        ConditionOperation::EndsWith => TextTest::EndsWith(value),
        ConditionOperation::Contains => TextTest::Contains(value),
        ConditionOperation::NotContains => TextTest::NotContains(value),
        ConditionOperation::Gte => TextTest::Gte(value),
        ConditionOperation::Lte => TextTest::Lte(value),
    };
    Ok(test)
}

fn order_test_datetime(condition: &Condition) -> SendcraftResult<OrderTest<DateTime<Utc>>> {
    let op = order_op(condition)?;
    let raw = expect_text(condition)?;
    let value = DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| {
            SendcraftError::Validation(format!(
                "field `{}` expects an RFC 3339 date, got `{raw}`: {e}",
                condition.field
            ))
        })?
        .with_timezone(&Utc);
    Ok(OrderTest { op, value })
}

fn order_test_float(condition: &Condition) -> SendcraftResult<OrderTest<f64>> {
    let op = order_op(condition)?;
    let value = condition.value.as_f64().ok_or_else(|| {
        SendcraftError::Validation(format!(
            "field `{}` expects a numeric value",
            condition.field
        ))
    })?;
    Ok(OrderTest { op, value })
}

fn order_op(condition: &Condition) -> SendcraftResult<OrderOp> {
    match condition.operation {
        ConditionOperation::Eq => Ok(OrderOp::Eq),
        ConditionOperation::Gte => Ok(OrderOp::Gte),
        ConditionOperation::Lte => Ok(OrderOp::Lte),
        _ => Err(invalid_operation(condition, "ordered field")),
    }
}

fn expect_text(condition: &Condition) -> SendcraftResult<String> {
    condition
        .value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            SendcraftError::Validation(format!(
                "field `{}` expects a string value",
                condition.field
            ))
        })
}

fn expect_bool(condition: &Condition) -> SendcraftResult<bool> {
    condition.value.as_bool().ok_or_else(|| {
        SendcraftError::Validation(format!(
            "field `{}` expects a boolean value",
            condition.field
        ))
    })
}

fn expect_days(condition: &Condition) -> SendcraftResult<i64> {
    let days = condition.value.as_i64().ok_or_else(|| {
        SendcraftError::Validation(format!(
            "field `{}` expects a whole number of days",
            condition.field
        ))
    })?;
    if days < 0 {
        return Err(SendcraftError::Validation(format!(
            "field `{}` expects a non-negative number of days",
            condition.field
        )));
    }
    Ok(days)
}

fn expect_tag_ids(condition: &Condition) -> SendcraftResult<Vec<Uuid>> {
    let parse = |raw: &str| {
        Uuid::parse_str(raw).map_err(|_| {
            SendcraftError::Validation(format!("`tags` expects tag ids, got `{raw}`"))
        })
    };
    match &condition.value {
        serde_json::Value::String(raw) => Ok(vec![parse(raw)?]),
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err(SendcraftError::Validation(
                    "`tags` expects at least one tag id".to_string(),
                ));
            }
            items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        SendcraftError::Validation("`tags` expects tag id strings".to_string())
                    })
                    .and_then(parse)
                })
                .collect()
        }
        _ => Err(SendcraftError::Validation(
            "`tags` expects a tag id or list of tag ids".to_string(),
        )),
    }
}

fn invalid_operation(condition: &Condition, domain: &str) -> SendcraftError {
    SendcraftError::Validation(format!(
        "operation {:?} is not valid for {domain} field `{}`",
        condition.operation, condition.field
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn audience() -> Audience {
        let mut audience = Audience::new("Newsletter");
        audience
            .properties
            .insert("plan".to_string(), PropertyKind::Text);
        audience
            .properties
            .insert("mrr".to_string(), PropertyKind::Float);
        audience
            .properties
            .insert("beta".to_string(), PropertyKind::Boolean);
        audience
    }

    #[test]
    fn test_classify_field() {
        assert_eq!(
            classify_field("email"),
            Some(FieldDomain::Direct(DirectField::Email))
        );
        assert_eq!(
            classify_field("properties.plan"),
            Some(FieldDomain::Property("plan".to_string()))
        );
        assert_eq!(classify_field("tags"), Some(FieldDomain::Tags));
        assert_eq!(
            classify_field("lastOpenedBroadcastEmailAt"),
            Some(FieldDomain::Activity(ActivityKind::OpenedBroadcastEmail))
        );
        assert_eq!(classify_field("properties."), None);
        assert_eq!(classify_field("passwordHash"), None);
    }

    #[test]
    fn test_unknown_property_matches_nothing() {
        let condition = Condition::new("properties.missing", ConditionOperation::Eq, "x");
        let predicate = compile_condition(&condition, &audience()).unwrap();
        assert!(matches!(predicate, Predicate::Nothing));
    }

    #[test]
    fn test_boolean_property_rejects_ordering() {
        let condition = Condition::new("properties.beta", ConditionOperation::Gte, true);
        let err = compile_condition(&condition, &audience()).unwrap_err();
        assert!(matches!(err, SendcraftError::Validation(_)));
    }

    #[test]
    fn test_float_property_rejects_text_value() {
        let condition = Condition::new("properties.mrr", ConditionOperation::Gte, "cheap");
        let err = compile_condition(&condition, &audience()).unwrap_err();
        assert!(matches!(err, SendcraftError::Validation(_)));
    }

    #[test]
    fn test_tags_accepts_id_and_list() {
        let tag_a = Uuid::new_v4();
        let tag_b = Uuid::new_v4();

        let single = Condition::new("tags", ConditionOperation::Eq, tag_a.to_string());
        let predicate = compile_condition(&single, &audience()).unwrap();
        assert!(matches!(predicate, Predicate::HasAnyTag(ref ids) if ids == &vec![tag_a]));

        let list = Condition::new(
            "tags",
            ConditionOperation::NotContains,
            serde_json::json!([tag_a.to_string(), tag_b.to_string()]),
        );
        let predicate = compile_condition(&list, &audience()).unwrap();
        assert!(matches!(predicate, Predicate::HasNoneOfTags(ref ids) if ids.len() == 2));
    }

    #[test]
    fn test_tags_rejects_substring_operations() {
        let condition = Condition::new(
            "tags",
            ConditionOperation::StartsWith,
            Uuid::new_v4().to_string(),
        );
        let err = compile_condition(&condition, &audience()).unwrap_err();
        assert!(matches!(err, SendcraftError::Validation(_)));
    }

    #[test]
    fn test_activity_operations() {
        let within = Condition::new("lastOpenedBroadcastEmailAt", ConditionOperation::Gte, 30);
        let predicate = compile_condition(&within, &audience()).unwrap();
        assert!(matches!(
            predicate,
            Predicate::ActivityWithinDays { days: 30, .. }
        ));

        let never = Condition::new(
            "lastClickedAutomationEmailLinkAt",
            ConditionOperation::Eq,
            serde_json::Value::Null,
        );
        let predicate = compile_condition(&never, &audience()).unwrap();
        assert!(matches!(predicate, Predicate::ActivityAbsent(_)));

        let ever = Condition::new(
            "lastSentAutomationEmailAt",
            ConditionOperation::NotContains,
            serde_json::Value::Null,
        );
        let predicate = compile_condition(&ever, &audience()).unwrap();
        assert!(matches!(predicate, Predicate::ActivityPresent(_)));

        let bad = Condition::new("lastSentBroadcastEmailAt", ConditionOperation::StartsWith, 3);
        assert!(compile_condition(&bad, &audience()).is_err());
    }
}
