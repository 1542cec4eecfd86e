use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;

use crate::{
    data_repository::{DataRepository, MemoryDataRepository},
    event::{AccessEvent, CustomEvent, Event},
    event_processor::{EventProcessor, EventProcessorConfig},
    model::Repository,
    synchronizer::{
        FileSynchronizer, PollingSynchronizer, PollingSynchronizerConfig, StreamingSynchronizer,
        Synchronizer,
    },
    Config, Detail, Error, Result, SyncMode, User, Value,
};

const REASON_UNINITIALIZED: &str = "FeatureProbe repository uninitialized";
const REASON_TOGGLE_NOT_EXIST: &str = "Toggle not exist";
const REASON_TYPE_MISMATCH: &str = "Value type mismatch";

/// A FeatureProbe server-side client.
///
/// The client keeps toggles up to date in the background and evaluates them locally. It is
/// thread-safe: share one instance (e.g., in an `Arc`) for the lifetime of the application.
///
/// # Examples
/// ```no_run
/// # use featureprobe::{Config, FeatureProbe, User};
/// let client = FeatureProbe::new("server-sdk-key", Config::new()).unwrap();
/// let user = User::new("user-id").with_attr("city", "Paris");
/// if client.bool_value("new_checkout", &user, false) {
///     // ...
/// }
/// client.close().unwrap();
/// ```
pub struct FeatureProbe {
    repository: Arc<dyn DataRepository>,
    synchronizer: Option<Box<dyn Synchronizer>>,
    event_processor: Option<EventProcessor>,
    max_prerequisites_deep: u32,
    closed: AtomicBool,
}

impl FeatureProbe {
    /// Create a client, start synchronizing toggles, and wait up to
    /// [`Config::start_wait`] for the first repository.
    ///
    /// Fails on configuration errors only. Synchronization failures are logged, and the client
    /// returns default values until toggles arrive.
    pub fn new(sdk_key: impl Into<String>, config: Config) -> Result<FeatureProbe> {
        let sdk_key = sdk_key.into();
        if sdk_key.trim().is_empty() {
            return Err(Error::BlankSdkKey);
        }

        let client = config.http.build_client(&sdk_key)?;
        let repository: Arc<dyn DataRepository> = Arc::new(MemoryDataRepository::new());

        let polling = || -> Result<PollingSynchronizer> {
            Ok(PollingSynchronizer::new(PollingSynchronizerConfig {
                repository: repository.clone(),
                client: client.clone(),
                toggles_url: config.toggles_url()?,
                refresh_interval: config.refresh_interval,
                refresh_jitter: config.refresh_jitter,
            }))
        };
        let synchronizer: Box<dyn Synchronizer> = match &config.sync_mode {
            SyncMode::Polling => Box::new(polling()?),
            SyncMode::Streaming => Box::new(StreamingSynchronizer::new(
                polling()?,
                config.realtime_url_resolved()?,
                sdk_key.as_str(),
            )),
            SyncMode::File(path) => {
                Box::new(FileSynchronizer::new(repository.clone(), path.clone()))
            }
        };

        let event_processor = EventProcessor::start(EventProcessorConfig {
            client,
            event_url: config.events_url()?,
            flush_interval: config.flush_interval,
        })?;

        synchronizer.sync()?;
        if !config.start_wait.is_zero() {
            log::info!(target: "featureprobe",
                       start_wait:debug = config.start_wait;
                       "waiting for FeatureProbe client to initialize");
            match synchronizer.wait_for_initialization(config.start_wait) {
                Ok(true) => {
                    log::info!(target: "featureprobe", "started FeatureProbe client successfully")
                }
                Ok(false) => {
                    log::warn!(target: "featureprobe", "initialization timeout exceeded for FeatureProbe client")
                }
                Err(err) => {
                    log::error!(target: "featureprobe", err:display; "FeatureProbe client failed to initialize")
                }
            }
        }

        Ok(FeatureProbe {
            repository,
            synchronizer: Some(synchronizer),
            event_processor: Some(event_processor),
            max_prerequisites_deep: config.max_prerequisites_deep,
            closed: AtomicBool::new(false),
        })
    }

    /// Create an offline client evaluating a fixed repository. No toggles are fetched and no
    /// events are sent.
    ///
    /// ```
    /// # use featureprobe::{FeatureProbe, Repository, User};
    /// let repository = Repository::from_json(r#"{"toggles": {}, "segments": {}}"#).unwrap();
    /// let client = FeatureProbe::with_repository(repository);
    /// assert_eq!(client.string_value("missing", &User::new("u"), "off"), "off");
    /// ```
    pub fn with_repository(repository: Repository) -> FeatureProbe {
        let data_repository = MemoryDataRepository::new();
        data_repository.refresh(repository);
        FeatureProbe {
            repository: Arc::new(data_repository),
            synchronizer: None,
            event_processor: None,
            max_prerequisites_deep: Config::DEFAULT_MAX_PREREQUISITES_DEEP,
            closed: AtomicBool::new(false),
        }
    }

    /// `true` once toggles have been loaded.
    pub fn initialized(&self) -> bool {
        self.repository.initialized()
    }

    /// Evaluate a toggle, returning `default_value` if it cannot be evaluated.
    pub fn value(&self, toggle_key: &str, user: &User, default_value: impl Into<Value>) -> Value {
        let default_value = default_value.into();
        let detail = self.evaluate(toggle_key, user, &default_value);
        detail.value.unwrap_or(default_value)
    }

    /// Evaluate a toggle, explaining the result.
    pub fn value_detail(
        &self,
        toggle_key: &str,
        user: &User,
        default_value: impl Into<Value>,
    ) -> Detail<Value> {
        let default_value = default_value.into();
        let detail = self.evaluate(toggle_key, user, &default_value);
        Detail {
            value: detail.value.unwrap_or(default_value),
            rule_index: detail.rule_index,
            variation_index: detail.variation_index,
            version: detail.version,
            reason: detail.reason,
        }
    }

    #[allow(missing_docs)]
    pub fn bool_value(&self, toggle_key: &str, user: &User, default_value: bool) -> bool {
        self.bool_detail(toggle_key, user, default_value).value
    }

    #[allow(missing_docs)]
    pub fn bool_detail(&self, toggle_key: &str, user: &User, default_value: bool) -> Detail<bool> {
        self.typed_detail(toggle_key, user, default_value, Value::as_bool)
    }

    /// Integer variations are served as floats.
    pub fn number_value(&self, toggle_key: &str, user: &User, default_value: f64) -> f64 {
        self.number_detail(toggle_key, user, default_value).value
    }

    #[allow(missing_docs)]
    pub fn number_detail(&self, toggle_key: &str, user: &User, default_value: f64) -> Detail<f64> {
        self.typed_detail(toggle_key, user, default_value, Value::as_f64)
    }

    #[allow(missing_docs)]
    pub fn string_value(&self, toggle_key: &str, user: &User, default_value: &str) -> String {
        self.string_detail(toggle_key, user, default_value).value
    }

    #[allow(missing_docs)]
    pub fn string_detail(
        &self,
        toggle_key: &str,
        user: &User,
        default_value: &str,
    ) -> Detail<String> {
        self.typed_detail(toggle_key, user, default_value.to_owned(), |value| {
            value.as_str().map(str::to_owned)
        })
    }

    /// Any variation is accepted and converted to JSON.
    pub fn json_value(
        &self,
        toggle_key: &str,
        user: &User,
        default_value: serde_json::Value,
    ) -> serde_json::Value {
        self.json_detail(toggle_key, user, default_value).value
    }

    #[allow(missing_docs)]
    pub fn json_detail(
        &self,
        toggle_key: &str,
        user: &User,
        default_value: serde_json::Value,
    ) -> Detail<serde_json::Value> {
        self.typed_detail(toggle_key, user, default_value, |value| Some(value.to_json()))
    }

    /// Report a custom event, optionally with a numeric value.
    pub fn track(&self, event_name: &str, user: &User, value: Option<f64>) {
        let Some(event_processor) = &self.event_processor else {
            return;
        };
        event_processor.push(Event::Custom(CustomEvent {
            time: now_millis(),
            user: user.key().to_owned(),
            name: event_name.to_owned(),
            value,
        }));
    }

    /// Ask for collected events to be sent now, without waiting for the flush interval.
    pub fn flush(&self) {
        if let Some(event_processor) = &self.event_processor {
            event_processor.flush();
        }
    }

    /// Send pending events and stop background threads. Evaluations afterwards return default
    /// values. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::info!(target: "featureprobe", "closing FeatureProbe client");
        if let Some(event_processor) = &self.event_processor {
            event_processor.shutdown()?;
        }
        if let Some(synchronizer) = &self.synchronizer {
            synchronizer.close()?;
        }
        self.repository.close();
        Ok(())
    }

    fn typed_detail<T>(
        &self,
        toggle_key: &str,
        user: &User,
        default_value: T,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Detail<T>
    where
        T: Into<Value> + Clone,
    {
        let detail = self.evaluate(toggle_key, user, &default_value.clone().into());
        let converted = detail.value.as_ref().and_then(&convert);

        match converted {
            Some(value) => Detail {
                value,
                rule_index: detail.rule_index,
                variation_index: detail.variation_index,
                version: detail.version,
                reason: detail.reason,
            },
            None => {
                let reason = match &detail.value {
                    None => detail.reason,
                    Some(value) => {
                        log::warn!(target: "featureprobe",
                                   toggle_key,
                                   value:serde;
                                   "toggle value type does not match requested type");
                        REASON_TYPE_MISMATCH.to_owned()
                    }
                };
                Detail {
                    value: default_value,
                    rule_index: detail.rule_index,
                    variation_index: detail.variation_index,
                    version: detail.version,
                    reason,
                }
            }
        }
    }

    /// Evaluate a toggle and record the access. `value` is `None` if no variation could be
    /// served and `default_value` was not used (repository or toggle missing).
    fn evaluate(&self, toggle_key: &str, user: &User, default_value: &Value) -> Detail<Option<Value>> {
        let Some(repository) = self.repository.snapshot() else {
            log::warn!(target: "featureprobe", toggle_key, user_key = user.key(); "evaluating a toggle before FeatureProbe repository is initialized");
            return Detail::defaulted(None, REASON_UNINITIALIZED);
        };

        let Some(toggle) = repository.toggles.get(toggle_key) else {
            log::debug!(target: "featureprobe", toggle_key; "toggle does not exist");
            return Detail::defaulted(None, REASON_TOGGLE_NOT_EXIST);
        };

        let result = toggle.eval(
            user,
            &repository.toggles,
            &repository.segments,
            Some(default_value),
            self.max_prerequisites_deep,
        );

        log::trace!(target: "featureprobe",
                    toggle_key,
                    user_key = user.key(),
                    value:serde = result.value,
                    reason:display = result.reason;
                    "evaluated a toggle");

        let detail = Detail {
            value: result.value,
            rule_index: result.rule_index,
            variation_index: result.variation_index,
            version: Some(result.version),
            reason: result.reason,
        };

        if let Some(event_processor) = &self.event_processor {
            event_processor.push(Event::Access(AccessEvent::new(
                now_millis(),
                user,
                toggle_key,
                &detail,
                toggle.track_access_events,
            )));
        }

        detail
    }
}

impl Drop for FeatureProbe {
    fn drop(&mut self) {
        // Background threads must not outlive the client.
        if let Err(err) = self.close() {
            log::warn!(target: "featureprobe", err:display; "error while closing FeatureProbe client");
        }
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}
