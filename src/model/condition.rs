use chrono::Utc;

use crate::{SemVer, User};

use super::{Condition, ConditionType, Segments};

impl Condition {
    /// Test the user against this condition.
    ///
    /// Never fails: a missing type or predicate, a predicate that does not fit the type, or a user
    /// attribute that cannot be parsed all count as no match.
    pub fn match_objects(&self, user: &User, segments: &Segments) -> bool {
        let (Some(condition_type), Some(predicate)) = (self.r#type, self.predicate) else {
            return false;
        };

        let result = match condition_type {
            ConditionType::String => match self.attribute(user) {
                Some(target) => predicate.match_string(target, &self.objects, &self.regexes),
                None => return false,
            },
            ConditionType::Segment => predicate.match_segment(&self.objects, |unique_id| {
                match segments.get(unique_id) {
                    Some(segment) => segment.contains(user, segments),
                    None => {
                        log::warn!(target: "featureprobe", unique_id; "segment referenced by condition does not exist");
                        false
                    }
                }
            }),
            ConditionType::Datetime => {
                let target = match self.attribute(user) {
                    Some(value) => match value.trim().parse::<i64>() {
                        Ok(timestamp) => timestamp,
                        Err(_) => {
                            self.warn_unparsable(user, value);
                            return false;
                        }
                    },
                    None => Utc::now().timestamp_millis(),
                };
                predicate.match_datetime(target, &self.objects)
            }
            ConditionType::Number => {
                let Some(value) = self.attribute(user) else {
                    return false;
                };
                match value.trim().parse::<f64>() {
                    Ok(target) => predicate.match_number(target, &self.objects),
                    Err(_) => {
                        self.warn_unparsable(user, value);
                        return false;
                    }
                }
            }
            ConditionType::Semver => {
                let Some(value) = self.attribute(user) else {
                    return false;
                };
                match SemVer::parse(value) {
                    Ok(target) => predicate.match_semver(&target, &self.objects),
                    Err(_) => {
                        self.warn_unparsable(user, value);
                        return false;
                    }
                }
            }
        };

        result.unwrap_or_else(|| {
            log::warn!(target: "featureprobe",
                       condition_type:debug,
                       predicate:debug;
                       "predicate does not apply to condition type");
            false
        })
    }

    /// The tested user attribute. Empty values count as absent.
    fn attribute<'a>(&self, user: &'a User) -> Option<&'a str> {
        user.get(&self.subject).filter(|value| !value.is_empty())
    }

    fn warn_unparsable(&self, user: &User, value: &str) {
        log::warn!(target: "featureprobe",
                   user_key = user.key(),
                   subject:display = self.subject,
                   value;
                   "user attribute cannot be parsed for condition");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::model::{Condition, ConditionType, Predicate, Segment, SegmentRule, Segments};
    use crate::User;

    fn condition(
        condition_type: ConditionType,
        subject: &str,
        predicate: Predicate,
        objects: &[&str],
    ) -> Condition {
        Condition {
            subject: subject.to_owned(),
            r#type: Some(condition_type),
            predicate: Some(predicate),
            objects: objects.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn no_segments() -> Segments {
        HashMap::new()
    }

    #[test]
    fn string_is_one_of() {
        let condition = condition(
            ConditionType::String,
            "userId",
            Predicate::IsOneOf,
            &["12345", "987654", "665544", "13797347245"],
        );

        let user = User::new("key").with_attr("userId", "12345");
        assert!(condition.match_objects(&user, &no_segments()));

        let user = User::new("key").with_attr("userId", "999999");
        assert!(!condition.match_objects(&user, &no_segments()));

        let user = User::new("key").with_attr("userId", "\t  \n  ");
        assert!(!condition.match_objects(&user, &no_segments()));
    }

    #[test]
    fn string_missing_or_empty_attribute_never_matches() {
        let condition = condition(ConditionType::String, "userId", Predicate::IsNotAnyOf, &["1"]);

        assert!(!condition.match_objects(&User::new("key"), &no_segments()));
        assert!(!condition.match_objects(&User::new("key").with_attr("userId", ""), &no_segments()));
        assert!(condition.match_objects(&User::new("key").with_attr("userId", "2"), &no_segments()));
    }

    #[test]
    fn unset_type_or_predicate_never_matches() {
        let user = User::new("key").with_attr("userId", "1");
        let mut condition = condition(ConditionType::String, "userId", Predicate::IsOneOf, &["1"]);
        assert!(condition.match_objects(&user, &no_segments()));

        condition.predicate = None;
        assert!(!condition.match_objects(&user, &no_segments()));

        condition.predicate = Some(Predicate::IsOneOf);
        condition.r#type = None;
        assert!(!condition.match_objects(&user, &no_segments()));
    }

    #[test]
    fn mismatched_predicate_never_matches() {
        let condition = condition(ConditionType::Number, "age", Predicate::IsOneOf, &["1"]);
        let user = User::new("key").with_attr("age", "1");
        assert!(!condition.match_objects(&user, &no_segments()));
    }

    #[test]
    fn segment_membership() {
        let segments: Segments = [(
            "some_segment1-fjoaefjaam".to_owned(),
            Segment {
                unique_id: "some_segment1-fjoaefjaam".to_owned(),
                version: 2,
                rules: vec![SegmentRule {
                    conditions: vec![condition(
                        ConditionType::String,
                        "userId",
                        Predicate::IsOneOf,
                        &["1", "2"],
                    )],
                }],
            },
        )]
        .into_iter()
        .collect();

        let is_in = condition(
            ConditionType::Segment,
            "",
            Predicate::IsIn,
            &["some_segment1-fjoaefjaam"],
        );
        let is_not_in = condition(
            ConditionType::Segment,
            "",
            Predicate::IsNotIn,
            &["some_segment1-fjoaefjaam"],
        );

        let member = User::new("key").with_attr("userId", "1");
        let outsider = User::new("key").with_attr("userId", "3");

        assert!(is_in.match_objects(&member, &segments));
        assert!(!is_in.match_objects(&outsider, &segments));
        assert!(!is_not_in.match_objects(&member, &segments));
        assert!(is_not_in.match_objects(&outsider, &segments));
    }

    #[test]
    fn missing_segment_counts_as_not_contained() {
        let user = User::new("key");

        let is_in = condition(ConditionType::Segment, "", Predicate::IsIn, &["nope"]);
        assert!(!is_in.match_objects(&user, &no_segments()));

        let is_not_in = condition(ConditionType::Segment, "", Predicate::IsNotIn, &["nope"]);
        assert!(is_not_in.match_objects(&user, &no_segments()));
    }

    #[test]
    fn datetime_with_explicit_attribute() {
        let after = condition(ConditionType::Datetime, "ts", Predicate::After, &["1000"]);
        let before = condition(ConditionType::Datetime, "ts", Predicate::Before, &["1000"]);

        let user = User::new("key").with_attr("ts", "1000");
        assert!(after.match_objects(&user, &no_segments()));
        assert!(!before.match_objects(&user, &no_segments()));

        let user = User::new("key").with_attr("ts", "999");
        assert!(!after.match_objects(&user, &no_segments()));
        assert!(before.match_objects(&user, &no_segments()));

        let user = User::new("key").with_attr("ts", "yesterday");
        assert!(!after.match_objects(&user, &no_segments()));
        assert!(!before.match_objects(&user, &no_segments()));
    }

    #[test]
    fn datetime_defaults_to_now() {
        let now = Utc::now().timestamp_millis();
        let past = (now - 60_000).to_string();
        let future = (now + 60_000).to_string();
        let user = User::new("key");

        let after_past = condition(ConditionType::Datetime, "ts", Predicate::After, &[&past]);
        assert!(after_past.match_objects(&user, &no_segments()));

        let before_future =
            condition(ConditionType::Datetime, "ts", Predicate::Before, &[&future]);
        assert!(before_future.match_objects(&user, &no_segments()));

        let after_future = condition(ConditionType::Datetime, "ts", Predicate::After, &[&future]);
        assert!(!after_future.match_objects(&user, &no_segments()));
    }

    #[test]
    fn number_condition() {
        let condition = condition(ConditionType::Number, "age", Predicate::GreaterOrEqual, &["18"]);

        assert!(condition.match_objects(&User::new("k").with_attr("age", " 18 "), &no_segments()));
        assert!(condition.match_objects(&User::new("k").with_attr("age", "30.5"), &no_segments()));
        assert!(!condition.match_objects(&User::new("k").with_attr("age", "17"), &no_segments()));
        assert!(!condition.match_objects(&User::new("k").with_attr("age", "old"), &no_segments()));
        assert!(!condition.match_objects(&User::new("k"), &no_segments()));
    }

    #[test]
    fn semver_condition() {
        let condition = condition(ConditionType::Semver, "version", Predicate::LessThan, &["1.0.0"]);

        assert!(condition.match_objects(
            &User::new("k").with_attr("version", "1.0.0-rc.1"),
            &no_segments()
        ));
        assert!(!condition.match_objects(
            &User::new("k").with_attr("version", "1.0.0"),
            &no_segments()
        ));
        assert!(!condition.match_objects(
            &User::new("k").with_attr("version", "one"),
            &no_segments()
        ));
    }

    #[test]
    fn regex_condition_compiles_patterns_once() {
        let condition: Condition = serde_json::from_str(
            r#"{"subject": "email", "type": "string", "predicate": "matches regex", "objects": [".*@example\\.com$"]}"#,
        )
        .unwrap();
        assert!(!condition.regexes.is_compiled());

        let user = User::new("k").with_attr("email", "a@example.com");
        assert!(condition.match_objects(&user, &no_segments()));
        assert!(condition.regexes.is_compiled());

        let user = User::new("k").with_attr("email", "a@example.org");
        assert!(!condition.match_objects(&user, &no_segments()));
    }
}
