use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::AccessEvent;
use crate::Value;

/// Number of accesses of a toggle that were served the same variation of the same version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AccessCounter {
    pub value: Option<Value>,
    pub version: Option<u64>,
    pub index: Option<usize>,
    pub count: u64,
}

impl AccessCounter {
    fn is_group(&self, event: &AccessEvent) -> bool {
        self.value == event.value
            && self.version == event.version
            && self.index == event.variation_index
    }
}

/// Aggregated toggle accesses since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecorder {
    /// Counters by toggle key.
    pub counters: HashMap<String, Vec<AccessCounter>>,
    /// Time of the first recorded access, in milliseconds since the Unix epoch.
    pub start_time: u64,
    /// Time the snapshot was taken. 0 for a live recorder.
    pub end_time: u64,
}

impl AccessRecorder {
    #[allow(missing_docs)]
    pub fn new() -> AccessRecorder {
        AccessRecorder::default()
    }

    #[allow(missing_docs)]
    pub fn add(&mut self, event: &AccessEvent) {
        if self.counters.is_empty() {
            self.start_time = now_millis();
        }

        let counters = self.counters.entry(event.key.clone()).or_default();
        match counters.iter_mut().find(|counter| counter.is_group(event)) {
            Some(counter) => counter.count += 1,
            None => counters.push(AccessCounter {
                value: event.value.clone(),
                version: event.version,
                index: event.variation_index,
                count: 1,
            }),
        }
    }

    /// A copy of the recorder, stamped with the current time as `end_time`.
    pub fn snapshot(&self) -> AccessRecorder {
        AccessRecorder {
            end_time: now_millis(),
            ..self.clone()
        }
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.counters.clear();
        self.start_time = 0;
        self.end_time = 0;
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}
