use crate::{HitResult, User};

use super::{ConditionType, Rule, Segments};

impl Rule {
    /// Match the user against all conditions and, if they pass, pick the variation to serve.
    ///
    /// A user missing an attribute tested by a string, number, or semver condition misses the rule
    /// with a warning reason. Datetime conditions fall back to the current time instead.
    pub fn hit(&self, user: &User, segments: &Segments, toggle_key: &str) -> HitResult {
        for condition in &self.conditions {
            if !matches!(
                condition.r#type,
                Some(ConditionType::Segment | ConditionType::Datetime)
            ) && !user.has_attr(&condition.subject)
            {
                return HitResult::missing_attribute(user.key(), &condition.subject);
            }
            if !condition.match_objects(user, segments) {
                return HitResult::miss();
            }
        }
        self.serve.eval_index(user, toggle_key)
    }
}
