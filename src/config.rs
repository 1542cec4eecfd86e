use std::{path::PathBuf, time::Duration};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use url::Url;

use crate::{Error, FeatureProbe, Result};

/// Where toggles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Poll FeatureProbe server every `refresh_interval`.
    Polling,
    /// Poll like [`SyncMode::Polling`], and also refresh as soon as FeatureProbe server pushes a
    /// toggle update over the realtime socket.
    Streaming,
    /// Load a repository JSON file once, at start.
    File(PathBuf),
}

/// Settings of the HTTP client used for synchronization and event delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Connection timeout.
    pub conn_timeout: Duration,
    /// Timeout for the whole request, including reading the response.
    pub read_timeout: Duration,
    #[allow(missing_docs)]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            conn_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            pool_max_idle_per_host: 10,
        }
    }
}

impl HttpConfig {
    /// Build a client that authenticates every request with `sdk_key`.
    pub(crate) fn build_client(&self, sdk_key: &str) -> Result<reqwest::blocking::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(sdk_key).map_err(|_| Error::InvalidSdkKey)?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("Rust/", env!("CARGO_PKG_VERSION"))),
        );

        Ok(reqwest::blocking::Client::builder()
            .default_headers(headers)
            .connect_timeout(self.conn_timeout)
            .timeout(self.read_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()?)
    }
}

/// Configuration for [`FeatureProbe`].
///
/// ```
/// # use std::time::Duration;
/// # use featureprobe::Config;
/// let config = Config::new()
///     .remote_url("https://featureprobe.example.com/server")
///     .refresh_interval(Duration::from_secs(10))
///     .start_wait(Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) remote_url: String,
    pub(crate) synchronizer_url: Option<String>,
    pub(crate) event_url: Option<String>,
    pub(crate) realtime_url: Option<String>,
    pub(crate) sync_mode: SyncMode,
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh_jitter: Duration,
    pub(crate) start_wait: Duration,
    pub(crate) max_prerequisites_deep: u32,
    pub(crate) flush_interval: Duration,
    pub(crate) http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote_url: Config::DEFAULT_REMOTE_URL.to_owned(),
            synchronizer_url: None,
            event_url: None,
            realtime_url: None,
            sync_mode: SyncMode::Polling,
            refresh_interval: Config::DEFAULT_REFRESH_INTERVAL,
            refresh_jitter: Duration::ZERO,
            start_wait: Config::DEFAULT_START_WAIT,
            max_prerequisites_deep: Config::DEFAULT_MAX_PREREQUISITES_DEEP,
            flush_interval: Config::DEFAULT_FLUSH_INTERVAL,
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Default FeatureProbe server address.
    pub const DEFAULT_REMOTE_URL: &'static str = "http://127.0.0.1:4007";
    #[allow(missing_docs)]
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
    #[allow(missing_docs)]
    pub const DEFAULT_START_WAIT: Duration = Duration::from_secs(5);
    #[allow(missing_docs)]
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
    #[allow(missing_docs)]
    pub const DEFAULT_MAX_PREREQUISITES_DEEP: u32 = 20;

    const TOGGLES_PATH: &'static str = "/api/server-sdk/toggles";
    const EVENTS_PATH: &'static str = "/api/events";
    const REALTIME_PATH: &'static str = "/realtime";

    /// Default configuration, talking to a FeatureProbe server at [`Config::DEFAULT_REMOTE_URL`].
    pub fn new() -> Config {
        Config::default()
    }

    /// Base URL of FeatureProbe server. Toggle and event URLs are derived from it unless set
    /// explicitly.
    pub fn remote_url(mut self, remote_url: impl Into<String>) -> Self {
        self.remote_url = remote_url.into();
        self
    }

    /// Override the URL toggles are fetched from.
    pub fn synchronizer_url(mut self, url: impl Into<String>) -> Self {
        self.synchronizer_url = Some(url.into());
        self
    }

    /// Override the URL events are posted to.
    pub fn event_url(mut self, url: impl Into<String>) -> Self {
        self.event_url = Some(url.into());
        self
    }

    /// Override the socket.io URL toggle updates are pushed from in [`SyncMode::Streaming`].
    pub fn realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = Some(url.into());
        self
    }

    #[allow(missing_docs)]
    pub fn sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Interval between two polls of FeatureProbe server.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Maximum random delay added to every refresh interval, spreading polls of many SDK
    /// instances.
    pub fn refresh_jitter(mut self, jitter: Duration) -> Self {
        self.refresh_jitter = jitter;
        self
    }

    /// How long [`FeatureProbe::new`] blocks waiting for the first repository. `Duration::ZERO`
    /// returns immediately; evaluations return defaults until toggles arrive.
    pub fn start_wait(mut self, start_wait: Duration) -> Self {
        self.start_wait = start_wait;
        self
    }

    /// Maximum depth of prerequisite chains.
    pub fn max_prerequisites_deep(mut self, deep: u32) -> Self {
        self.max_prerequisites_deep = deep;
        self
    }

    /// Interval between two deliveries of events.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[allow(missing_docs)]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Create a new [`FeatureProbe`] client with this configuration.
    pub fn to_client(self, sdk_key: impl Into<String>) -> Result<FeatureProbe> {
        FeatureProbe::new(sdk_key, self)
    }

    pub(crate) fn toggles_url(&self) -> Result<Url> {
        self.endpoint(self.synchronizer_url.as_deref(), Config::TOGGLES_PATH)
    }

    pub(crate) fn events_url(&self) -> Result<Url> {
        self.endpoint(self.event_url.as_deref(), Config::EVENTS_PATH)
    }

    pub(crate) fn realtime_url_resolved(&self) -> Result<Url> {
        self.endpoint(self.realtime_url.as_deref(), Config::REALTIME_PATH)
    }

    fn endpoint(&self, explicit: Option<&str>, path: &str) -> Result<Url> {
        let url = match explicit {
            Some(url) => url.to_owned(),
            None => format!("{}{}", self.remote_url.trim_end_matches('/'), path),
        };
        Url::parse(&url).map_err(Error::InvalidUrl)
    }
}
