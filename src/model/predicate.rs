use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::SemVer;

/// Comparison applied between a user attribute and the objects of a condition.
///
/// Which predicates are valid depends on the condition type: string predicates for `string`,
/// `is in`/`is not in` for `segment`, `after`/`before` for `datetime`, and the comparison
/// operators for `number` and `semver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Predicate {
    #[serde(rename = "is one of")]
    IsOneOf,
    #[serde(rename = "ends with")]
    EndsWith,
    #[serde(rename = "starts with")]
    StartsWith,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "matches regex")]
    MatchesRegex,
    #[serde(rename = "is not any of")]
    IsNotAnyOf,
    #[serde(rename = "does not end with")]
    DoesNotEndWith,
    #[serde(rename = "does not start with")]
    DoesNotStartWith,
    #[serde(rename = "does not contain")]
    DoesNotContain,
    #[serde(rename = "does not match regex")]
    DoesNotMatchRegex,
    #[serde(rename = "is in")]
    IsIn,
    #[serde(rename = "is not in")]
    IsNotIn,
    #[serde(rename = "after")]
    After,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
}

// The matchers below return `None` if the predicate does not apply to the value family.
//
// Positive predicates match if any object matches. Negative predicates ("is not any of", "does
// not ...", "!=") match only if no object matches.
impl Predicate {
    pub(crate) fn match_string(
        self,
        target: &str,
        objects: &[String],
        regexes: &RegexCache,
    ) -> Option<bool> {
        let result = match self {
            Predicate::IsOneOf => objects.iter().any(|o| target == o),
            Predicate::EndsWith => objects.iter().any(|o| target.ends_with(o.as_str())),
            Predicate::StartsWith => objects.iter().any(|o| target.starts_with(o.as_str())),
            Predicate::Contains => objects.iter().any(|o| target.contains(o.as_str())),
            Predicate::MatchesRegex => regexes
                .get(objects)
                .iter()
                .any(|re| re.as_ref().is_some_and(|re| re.is_match(target))),
            Predicate::IsNotAnyOf => objects.iter().all(|o| target != o),
            Predicate::DoesNotEndWith => objects.iter().all(|o| !target.ends_with(o.as_str())),
            Predicate::DoesNotStartWith => {
                objects.iter().all(|o| !target.starts_with(o.as_str()))
            }
            Predicate::DoesNotContain => objects.iter().all(|o| !target.contains(o.as_str())),
            // An invalid pattern cannot prove the target does not match it.
            Predicate::DoesNotMatchRegex => regexes
                .get(objects)
                .iter()
                .all(|re| re.as_ref().is_some_and(|re| !re.is_match(target))),
            _ => return None,
        };
        Some(result)
    }

    /// `contains` reports whether the user is in the segment with the given id.
    pub(crate) fn match_segment(
        self,
        objects: &[String],
        contains: impl Fn(&str) -> bool,
    ) -> Option<bool> {
        let result = match self {
            Predicate::IsIn => objects.iter().any(|id| contains(id.as_str())),
            Predicate::IsNotIn => objects.iter().all(|id| !contains(id.as_str())),
            _ => return None,
        };
        Some(result)
    }

    /// `target` and objects are timestamps in milliseconds since the Unix epoch.
    pub(crate) fn match_datetime(self, target: i64, objects: &[String]) -> Option<bool> {
        let parsed = || objects.iter().filter_map(|o| o.trim().parse::<i64>().ok());
        let result = match self {
            Predicate::After => parsed().any(|o| target >= o),
            Predicate::Before => parsed().any(|o| target < o),
            _ => return None,
        };
        Some(result)
    }

    pub(crate) fn match_number(self, target: f64, objects: &[String]) -> Option<bool> {
        let parsed = || objects.iter().map(|o| o.trim().parse::<f64>().ok());
        self.compare(parsed(), |o| o.partial_cmp(&target).map(|ord| ord.reverse()))
    }

    pub(crate) fn match_semver(self, target: &SemVer, objects: &[String]) -> Option<bool> {
        let parsed = objects.iter().map(|o| match SemVer::parse(o) {
            Ok(version) => Some(version),
            Err(err) => {
                log::warn!(target: "featureprobe", object:display = o, err:display; "invalid semver object in condition");
                None
            }
        });
        self.compare(parsed, |o| Some(target.cmp(o)))
    }

    /// Shared by numeric and semver conditions. `cmp` orders the target against one object.
    /// Objects that failed to parse (`None`) never match.
    fn compare<T>(
        self,
        objects: impl Iterator<Item = Option<T>>,
        cmp: impl Fn(&T) -> Option<std::cmp::Ordering>,
    ) -> Option<bool> {
        use std::cmp::Ordering::*;

        let mut ords = objects.map(|o| o.as_ref().and_then(&cmp));
        let result = match self {
            Predicate::Equal => ords.any(|ord| ord == Some(Equal)),
            Predicate::NotEqual => ords.all(|ord| matches!(ord, Some(Less | Greater))),
            Predicate::GreaterThan => ords.any(|ord| ord == Some(Greater)),
            Predicate::GreaterOrEqual => ords.any(|ord| matches!(ord, Some(Greater | Equal))),
            Predicate::LessThan => ords.any(|ord| ord == Some(Less)),
            Predicate::LessOrEqual => ords.any(|ord| matches!(ord, Some(Less | Equal))),
            _ => return None,
        };
        Some(result)
    }
}

/// Regexes compiled from the objects of one condition, on first use. A condition belongs to one
/// repository snapshot, so a refreshed repository compiles its patterns anew.
#[derive(Default, Clone)]
pub(crate) struct RegexCache(OnceLock<Vec<Option<Regex>>>);

impl RegexCache {
    fn get(&self, objects: &[String]) -> &[Option<Regex>] {
        self.0
            .get_or_init(|| objects.iter().map(|o| compile_regex(o)).collect())
    }

    #[cfg(test)]
    pub(crate) fn is_compiled(&self) -> bool {
        self.0.get().is_some()
    }
}

// Derived state, equal whenever the objects are.
impl PartialEq for RegexCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for RegexCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegexCache")
            .field(&self.0.get().map(Vec::len))
            .finish()
    }
}

fn compile_regex(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            log::warn!(target: "featureprobe", pattern, err:display; "invalid regex in condition");
            None
        }
    }
}
