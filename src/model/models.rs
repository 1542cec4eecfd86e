use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Result, Value};

use super::{predicate::RegexCache, Predicate};

/// Toggles by key.
pub type Toggles = HashMap<String, Toggle>;

/// Segments by unique id.
pub type Segments = HashMap<String, Segment>;

/// All toggles and segments of an environment. This is the response format of the server SDK
/// toggles endpoint and of repository files.
///
/// A `Repository` is immutable once built; a new one replaces it wholesale on every
/// synchronization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Toggles configuration.
    ///
    /// A toggle that fails to parse (e.g., new server format) is dropped, so that other toggles
    /// are still served.
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub toggles: Toggles,
    /// Segments configuration. Parsed leniently, like `toggles`.
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub segments: Segments,
}

impl Repository {
    #[allow(missing_docs)]
    pub fn new(toggles: Toggles, segments: Segments) -> Repository {
        Repository { toggles, segments }
    }

    /// Parse a repository from its JSON representation.
    pub fn from_json(json: &str) -> Result<Repository> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the repository back to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Deserialize)]
#[serde(untagged)]
enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}

fn deserialize_lenient<'de, D, T>(deserializer: D) -> std::result::Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let entries = HashMap::<String, TryParse<T>>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|(key, entry)| match entry {
            TryParse::Parsed(value) => Some((key, value)),
            TryParse::ParseFailed(json) => {
                log::warn!(target: "featureprobe",
                           entry_key:display = key,
                           json:serde;
                           "dropping repository entry that failed to parse");
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Toggle {
    pub key: String,
    pub enabled: bool,
    /// Increases on every change of the toggle definition.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub disabled_serve: Serve,
    #[serde(default)]
    pub default_serve: Serve,
    /// Rules in priority order; the first matching rule wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Variation values, addressed by index from serves and splits.
    #[serde(default)]
    pub variations: Vec<Value>,
    /// Toggles the user must have been served specific values of.
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub for_client: bool,
    /// Send complete access events (not only counters) for this toggle.
    #[serde(default)]
    pub track_access_events: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<u64>,
}

/// Decides which variation is served: a fixed `select`ed index or a percentage `split`.
///
/// `select` takes precedence when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Serve {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
}

/// Percentage rollout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    /// For each variation index, the buckets (out of 10000) that are served that variation.
    #[serde(default)]
    pub distribution: Vec<Vec<Range>>,
    /// User attribute to hash instead of the user key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    /// Hash salt. The toggle key is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

/// A half-open bucket range `[start, end)`, written as a `[start, end]` pair on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Range(pub u64, pub u64);

impl Range {
    #[allow(missing_docs)]
    pub fn contains(&self, bucket: u64) -> bool {
        self.0 <= bucket && bucket < self.1
    }
}

/// Conditions joined by AND, serving `serve` when all of them match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Rule {
    #[serde(default)]
    pub serve: Serve,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    /// Name of the user attribute to test. Ignored by segment conditions.
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "type", default)]
    pub r#type: Option<ConditionType>,
    #[serde(default)]
    pub predicate: Option<Predicate>,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(skip)]
    pub(crate) regexes: RegexCache,
}

/// How a condition interprets the user attribute and its objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ConditionType {
    String,
    Segment,
    Datetime,
    Number,
    Semver,
}

/// The evaluated value of toggle `key` must equal `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Prerequisite {
    pub key: String,
    pub value: Value,
}

/// A reusable group of users. A user belongs to the segment if any of its rules matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Segment {
    pub unique_id: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
}

/// Conditions joined by AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SegmentRule {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
