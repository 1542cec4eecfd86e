use serde::{Deserialize, Serialize};

use crate::{User, Value};

/// An event reported to FeatureProbe server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Event {
    /// A toggle was evaluated.
    Access(AccessEvent),
    /// A custom metric reported with [`FeatureProbe::track`](crate::FeatureProbe::track).
    Custom(CustomEvent),
}

impl Event {
    /// Creation time, in milliseconds since the Unix epoch.
    pub fn time(&self) -> u64 {
        match self {
            Event::Access(event) => event.time,
            Event::Custom(event) => event.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AccessEvent {
    pub time: u64,
    /// Key of the user the toggle was evaluated for.
    pub user: String,
    /// Toggle key.
    pub key: String,
    pub value: Option<Value>,
    pub version: Option<u64>,
    pub variation_index: Option<usize>,
    pub rule_index: Option<usize>,
    #[serde(default)]
    pub reason: String,
    /// Only kept in full (rather than just counted) when the toggle asks for it.
    #[serde(skip)]
    pub track_access_events: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CustomEvent {
    pub time: u64,
    /// Key of the user that triggered the event.
    pub user: String,
    /// Event name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl AccessEvent {
    pub(crate) fn new(
        time: u64,
        user: &User,
        key: &str,
        detail: &crate::Detail<Option<Value>>,
        track_access_events: bool,
    ) -> AccessEvent {
        AccessEvent {
            time,
            user: user.key().to_owned(),
            key: key.to_owned(),
            value: detail.value.clone(),
            version: detail.version,
            variation_index: detail.variation_index,
            rule_index: detail.rule_index,
            reason: detail.reason.clone(),
            track_access_events,
        }
    }
}
