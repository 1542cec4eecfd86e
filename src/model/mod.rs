//! Toggle and segment definitions, and their evaluation.
//!
//! Types here mirror the JSON served by FeatureProbe server. Evaluation methods hang off the types
//! they evaluate: [`Toggle::eval`] drives [`Rule::hit`], [`Condition::match_objects`],
//! [`Segment::contains`], [`Serve::eval_index`], and [`Split::find_index`].
mod condition;
mod models;
mod predicate;
mod prerequisite;
mod rule;
mod segment;
mod serve;
mod split;
mod toggle;

pub use models::*;
pub use predicate::Predicate;
