use crate::{HitResult, User};

use super::{ConditionType, Segment, SegmentRule, Segments};

impl Segment {
    /// `true` if any rule of the segment matches the user.
    pub fn contains(&self, user: &User, segments: &Segments) -> bool {
        self.rules.iter().any(|rule| {
            let result = rule.hit(user, segments);
            if let Some(reason) = &result.reason {
                log::debug!(target: "featureprobe",
                            segment:display = self.unique_id,
                            reason:display;
                            "segment rule missed");
            }
            result.hit
        })
    }
}

impl SegmentRule {
    /// Hits if every condition matches. A condition on an attribute the user does not have
    /// misses the rule with a warning reason, without being evaluated. Segment conditions test
    /// no attribute.
    pub fn hit(&self, user: &User, segments: &Segments) -> HitResult {
        for condition in &self.conditions {
            if condition.r#type != Some(ConditionType::Segment) && !user.has_attr(&condition.subject)
            {
                return HitResult::missing_attribute(user.key(), &condition.subject);
            }
            if !condition.match_objects(user, segments) {
                return HitResult::miss();
            }
        }
        HitResult {
            hit: true,
            index: None,
            reason: None,
        }
    }
}
