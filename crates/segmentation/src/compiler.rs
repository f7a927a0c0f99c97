//! Recursive filter compilation: lowers a declarative `FilterGroup` into
//! a `Predicate` tree. Stateless, so the segment query path and the
//! automation rule path produce identical results for identical inputs.

use sendcraft_core::error::SendcraftResult;
use sendcraft_core::types::Audience;

use crate::conditions::compile_condition;
use crate::filter::{FilterGroup, GroupOperator};
use crate::predicates::Predicate;

/// Compiles filter groups against an audience's property-type registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCompiler;

impl FilterCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Lower a filter group into an evaluable predicate.
    ///
    /// Empty-group policy: an empty `conditions` or `groups` list matches
    /// every contact regardless of operator. An unconfigured filter
    /// selects the whole audience.
    pub fn compile(&self, group: &FilterGroup, audience: &Audience) -> SendcraftResult<Predicate> {
        compile_group(group, audience)
    }

    /// Authoring-time validation: rejects malformed shapes and invalid
    /// operator/field combinations before anything is persisted.
    pub fn validate(&self, group: &FilterGroup, audience: &Audience) -> SendcraftResult<()> {
        self.compile(group, audience).map(|_| ())
    }
}

fn compile_group(group: &FilterGroup, audience: &Audience) -> SendcraftResult<Predicate> {
    match group {
        FilterGroup::Composite { operator, groups } => {
            if groups.is_empty() {
                return Ok(Predicate::Everything);
            }
            let compiled = groups
                .iter()
                .map(|g| compile_group(g, audience))
                .collect::<SendcraftResult<Vec<_>>>()?;
            Ok(combine(*operator, compiled))
        }
        FilterGroup::Leaf {
            operator,
            conditions,
        } => {
            if conditions.is_empty() {
                return Ok(Predicate::Everything);
            }
            let compiled = conditions
                .iter()
                .map(|c| compile_condition(c, audience))
                .collect::<SendcraftResult<Vec<_>>>()?;
            Ok(combine(*operator, compiled))
        }
    }
}

fn combine(operator: GroupOperator, predicates: Vec<Predicate>) -> Predicate {
    match operator {
        GroupOperator::And => Predicate::All(predicates),
        GroupOperator::Or => Predicate::Any(predicates),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::filter::{Condition, ConditionOperation};
    use sendcraft_core::types::{Contact, PropertyKind, PropertyValue};
    use uuid::Uuid;

    fn audience() -> Audience {
        let mut audience = Audience::new("Newsletter");
        audience
            .properties
            .insert("plan".to_string(), PropertyKind::Text);
        audience
    }

    fn contact(audience: &Audience, email: &str) -> Contact {
        Contact::new(audience.id, email)
    }

    #[test]
    fn test_starts_with_matches_only_prefixed_contact() {
        let audience = audience();
        let filter = FilterGroup::all_of(vec![FilterGroup::all(vec![Condition::new(
            "email",
            ConditionOperation::StartsWith,
            "alice",
        )])]);

        let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();

        let alice = contact(&audience, "alice@x.com");
        let bob = contact(&audience, "bob@x.com");
        assert!(predicate.matches(&alice));
        assert!(!predicate.matches(&bob));
    }

    #[test]
    fn test_or_of_and_leaves() {
        let audience = audience();
        // Matches contacts satisfying A (email ends with @gmail.com) or
        // B (plan equals "pro").
        let filter = FilterGroup::any_of(vec![
            FilterGroup::all(vec![Condition::new(
                "email",
                ConditionOperation::EndsWith,
                "@gmail.com",
            )]),
            FilterGroup::all(vec![Condition::new(
                "properties.plan",
                ConditionOperation::Eq,
                "pro",
            )]),
        ]);
        let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();

        let gmail = contact(&audience, "a@gmail.com");

        let mut pro = contact(&audience, "b@yahoo.com");
        pro.properties
            .insert("plan".to_string(), PropertyValue::Text("pro".to_string()));

        let neither = contact(&audience, "c@yahoo.com");

        assert!(predicate.matches(&gmail));
        assert!(predicate.matches(&pro));
        assert!(!predicate.matches(&neither));
    }

    #[test]
    fn test_and_leaf_requires_all_conditions() {
        let audience = audience();
        let filter = FilterGroup::all(vec![
            Condition::new("email", ConditionOperation::EndsWith, "@gmail.com"),
            Condition::new("email", ConditionOperation::StartsWith, "a"),
        ]);
        let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();

        assert!(predicate.matches(&contact(&audience, "a@gmail.com")));
        assert!(!predicate.matches(&contact(&audience, "b@gmail.com")));
        assert!(!predicate.matches(&contact(&audience, "a@yahoo.com")));
    }

    #[test]
    fn test_empty_groups_match_everything() {
        let audience = audience();
        let anyone = contact(&audience, "x@y.com");

        for filter in [
            FilterGroup::all(vec![]),
            FilterGroup::any(vec![]),
            FilterGroup::all_of(vec![]),
            FilterGroup::any_of(vec![]),
        ] {
            let predicate = FilterCompiler::new().compile(&filter, &audience).unwrap();
            assert!(predicate.matches(&anyone), "filter {:?}", filter);
        }
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let audience = audience();
        let filter = FilterGroup::any_of(vec![
            FilterGroup::all(vec![Condition::new(
                "email",
                ConditionOperation::Contains,
                "gmail",
            )]),
            FilterGroup::all(vec![Condition::new(
                "properties.plan",
                ConditionOperation::Eq,
                "pro",
            )]),
        ]);

        let compiler = FilterCompiler::new();
        let first = compiler.compile(&filter, &audience).unwrap();
        let second = compiler.compile(&filter, &audience).unwrap();

        let mut contacts = vec![
            contact(&audience, "a@gmail.com"),
            contact(&audience, "b@yahoo.com"),
            contact(&audience, "c@gmail.org"),
        ];
        contacts[1]
            .properties
            .insert("plan".to_string(), PropertyValue::Text("pro".to_string()));

        for c in &contacts {
            assert_eq!(first.matches(c), second.matches(c));
        }
    }

    #[test]
    fn test_validate_rejects_invalid_operator() {
        let audience = audience();
        let filter = FilterGroup::all(vec![Condition::new(
            "tags",
            ConditionOperation::Gte,
            Uuid::new_v4().to_string(),
        )]);
        assert!(FilterCompiler::new().validate(&filter, &audience).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_field() {
        let audience = audience();
        let filter = FilterGroup::all(vec![Condition::new(
            "shoeSize",
            ConditionOperation::Eq,
            "44",
        )]);
        assert!(FilterCompiler::new().validate(&filter, &audience).is_err());
    }
}
