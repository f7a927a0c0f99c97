//! Audience segmentation: a declarative nested boolean filter language
//! compiled into predicates over contact records. Shared by ad-hoc
//! segment queries and automation rule branching.

pub mod compiler;
pub mod conditions;
pub mod filter;
pub mod predicates;

pub use compiler::FilterCompiler;
pub use filter::{Condition, ConditionOperation, FilterGroup, GroupOperator};
pub use predicates::Predicate;
