//! The Rust server-side SDK for FeatureProbe, a feature management service.
//!
//! # Overview
//!
//! The SDK revolves around a [`FeatureProbe`] client that evaluates toggles for [`User`]s, where
//! each user has a unique key and string attributes associated with it. Toggles are fetched from
//! FeatureProbe server in the background and evaluated locally, so evaluation never blocks on the
//! network.
//!
//! ```no_run
//! use featureprobe::{Config, FeatureProbe, User};
//!
//! let client = FeatureProbe::new("server-sdk-key", Config::new()).unwrap();
//! let user = User::new("user-id").with_attr("city", "Paris");
//!
//! let detail = client.string_detail("color_toggle", &user, "blue");
//! println!("{} ({})", detail.value, detail.reason);
//!
//! client.close().unwrap();
//! ```
//!
//! Every evaluation reports an access event; aggregated counters (and full events for toggles
//! that ask for it) are periodically sent back to FeatureProbe server together with custom events
//! reported with [`FeatureProbe::track`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. They are only returned while creating and closing
//! the client. Evaluation never fails: when a toggle cannot be evaluated, the default value passed
//! by the caller is returned and [`Detail::reason`] explains why.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target
//! `featureprobe`. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod access_recorder;
mod client;
mod config;
mod data_repository;
mod error;
mod evaluation;
mod event;
mod event_processor;
pub mod model;
mod semver;
mod sharder;
mod synchronizer;
mod user;
mod value;

#[cfg(test)]
mod test_server;

pub use access_recorder::{AccessCounter, AccessRecorder};
pub use client::FeatureProbe;
pub use config::{Config, HttpConfig, SyncMode};
pub use data_repository::{DataRepository, MemoryDataRepository};
pub use error::{Error, Result};
pub use evaluation::{Detail, EvaluationResult, HitResult};
pub use event::{AccessEvent, CustomEvent, Event};
pub use event_processor::EventProcessor;
pub use model::Repository;
pub use crate::semver::SemVer;
pub use synchronizer::{
    FileSynchronizer, PollingSynchronizer, StreamingSynchronizer, Synchronizer,
};
pub use user::{Attributes, User};
pub use value::Value;
