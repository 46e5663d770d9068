//! Shared rule machinery: condition grammar and TTL caches

pub mod cache;
pub mod conditions;

pub use cache::TtlCache;
pub use conditions::{
    compare, field_value, EventCondition, FieldCondition, FieldOperator, MetadataPredicate,
    RuleCondition, ThresholdCondition,
};
