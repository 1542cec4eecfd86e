use serde::{Deserialize, Serialize};

use crate::Value;

/// Outcome of matching a user against a rule, serve, or split.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HitResult {
    /// `true` if the user matched.
    pub hit: bool,
    /// Selected variation index.
    pub index: Option<usize>,
    /// Warning or explanation, e.g. a missing user attribute.
    pub reason: Option<String>,
}

impl HitResult {
    pub(crate) fn hit(index: usize) -> HitResult {
        HitResult {
            hit: true,
            index: Some(index),
            reason: None,
        }
    }

    pub(crate) fn miss() -> HitResult {
        HitResult::default()
    }

    pub(crate) fn miss_with_reason(reason: impl Into<String>) -> HitResult {
        HitResult {
            hit: false,
            index: None,
            reason: Some(reason.into()),
        }
    }

    pub(crate) fn with_reason(mut self, reason: impl Into<String>) -> HitResult {
        self.reason = Some(reason.into());
        self
    }

    pub(crate) fn missing_attribute(user_key: &str, attribute: &str) -> HitResult {
        HitResult::miss_with_reason(format!(
            "Warning: User with key '{user_key}' does not have attribute name '{attribute}'"
        ))
    }
}

/// Result of evaluating a toggle for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Served variation, or the caller's default if no variation was selected.
    pub value: Option<Value>,
    /// Index of the matched rule. `None` for default and disabled results.
    pub rule_index: Option<usize>,
    /// Index of the served variation.
    pub variation_index: Option<usize>,
    /// Version of the toggle at evaluation time.
    pub version: u64,
    /// Human-readable explanation of the outcome.
    pub reason: String,
}

/// Evaluation result returned by [`FeatureProbe::value_detail`](crate::FeatureProbe::value_detail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail<T> {
    /// Evaluated value, or the default passed by the caller.
    pub value: T,
    /// Index of the matched rule, if a rule matched.
    pub rule_index: Option<usize>,
    /// Index of the served variation.
    pub variation_index: Option<usize>,
    /// Toggle version, if the toggle was evaluated.
    pub version: Option<u64>,
    /// Explanation of the outcome.
    pub reason: String,
}

impl<T> Detail<T> {
    pub(crate) fn defaulted(value: T, reason: impl Into<String>) -> Detail<T> {
        Detail {
            value,
            rule_index: None,
            variation_index: None,
            version: None,
            reason: reason.into(),
        }
    }
}
