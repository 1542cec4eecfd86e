use std::{
    path::PathBuf,
    sync::{
        mpsc::{RecvTimeoutError, Sender},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng};
use reqwest::StatusCode;
use rust_socketio::{client::Client as SocketClient, ClientBuilder, Payload, RawClient, TransportType};
use serde_json::json;
use url::Url;

use crate::{data_repository::DataRepository, model::Repository, Error, Result};

/// Keeps a [`DataRepository`] up to date.
pub trait Synchronizer: Send + Sync {
    /// Start synchronizing. Returns immediately; use
    /// [`wait_for_initialization`](Synchronizer::wait_for_initialization) to block until the first
    /// repository is stored.
    fn sync(&self) -> Result<()>;

    /// Stop synchronizing and release background resources.
    fn close(&self) -> Result<()>;

    /// `true` once the first synchronization completed, successfully or not.
    fn initialized(&self) -> bool;

    /// Block until the first synchronization completes or `timeout` elapses.
    ///
    /// Returns `Ok(true)` once a repository was stored, `Ok(false)` on timeout, and the error of
    /// an unrecoverable failure (such as [`Error::Unauthorized`]).
    fn wait_for_initialization(&self, timeout: Duration) -> Result<bool>;
}

/// Result of the first synchronization. `None` until it completes.
type FirstResult = Arc<(Mutex<Option<Result<()>>>, Condvar)>;

fn new_first_result() -> FirstResult {
    Arc::new((Mutex::new(None), Condvar::new()))
}

fn set_first_result(first_result: &FirstResult, value: Result<()>) {
    let Ok(mut slot) = first_result.0.lock() else {
        return;
    };
    // Later updates only matter if the first attempt failed.
    if !matches!(*slot, Some(Ok(()))) {
        *slot = Some(value);
        first_result.1.notify_all();
    }
}

fn wait_first_result(
    first_result: &FirstResult,
    timeout: Duration,
    panicked: Error,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    let mut lock = first_result.0.lock().map_err(|_| panicked.clone())?;
    loop {
        match &*lock {
            Some(Ok(())) => return Ok(true),
            Some(Err(err @ Error::Unauthorized)) => return Err(err.clone()),
            _ => {}
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        lock = first_result
            .1
            .wait_timeout(lock, remaining)
            .map_err(|_| panicked.clone())?
            .0;
    }
}

pub(crate) struct PollingSynchronizerConfig {
    pub repository: Arc<dyn DataRepository>,
    pub client: reqwest::blocking::Client,
    pub toggles_url: Url,
    pub refresh_interval: Duration,
    pub refresh_jitter: Duration,
}

/// Polls FeatureProbe server for toggles on a background thread.
pub struct PollingSynchronizer {
    config: Arc<PollingSynchronizerConfig>,
    thread: Mutex<Option<PollerThread>>,
    first_result: FirstResult,
}

struct PollerThread {
    join_handle: JoinHandle<()>,
    /// Used to send commands to the poller thread.
    command_sender: Sender<Command>,
}

enum Command {
    /// Fetch toggles now instead of waiting for the next interval.
    Refresh,
    Stop,
}

impl PollingSynchronizer {
    pub(crate) fn new(config: PollingSynchronizerConfig) -> PollingSynchronizer {
        PollingSynchronizer {
            config: Arc::new(config),
            thread: Mutex::new(None),
            first_result: new_first_result(),
        }
    }

    /// Wake the poller thread to fetch toggles immediately. Does nothing until
    /// [`sync`](Synchronizer::sync) was called, or after close.
    pub(crate) fn refresh_now(&self) {
        if let Ok(thread) = self.thread.lock() {
            if let Some(thread) = thread.as_ref() {
                // Error means that the receiver was dropped (thread exited).
                let _ = thread.command_sender.send(Command::Refresh);
            }
        }
    }
}

impl Synchronizer for PollingSynchronizer {
    fn sync(&self) -> Result<()> {
        let mut thread = self
            .thread
            .lock()
            .map_err(|_| Error::SynchronizerThreadPanicked)?;
        if thread.is_some() {
            return Ok(());
        }

        let (command_sender, command_receiver) = std::sync::mpsc::channel::<Command>();
        let config = self.config.clone();
        let first_result = self.first_result.clone();

        let join_handle = std::thread::Builder::new()
            .name("featureprobe-synchronizer".to_owned())
            .spawn(move || loop {
                match poll(&config) {
                    Ok(()) => set_first_result(&first_result, Ok(())),
                    Err(Error::Unauthorized) => {
                        log::warn!(target: "featureprobe", "client is not authorized. Check your sdk key");
                        set_first_result(&first_result, Err(Error::Unauthorized));
                        // Unauthorized means that the sdk key is not valid and thus is not
                        // recoverable. Stop the poller thread.
                        return;
                    }
                    Err(err) => {
                        log::warn!(target: "featureprobe", err:display; "error while fetching toggles");
                        set_first_result(&first_result, Err(err));
                    }
                }

                let timeout = jitter(config.refresh_interval, config.refresh_jitter);
                match command_receiver.recv_timeout(timeout) {
                    Err(RecvTimeoutError::Timeout) => {
                        // Timed out. Loop to fetch toggles again.
                    }
                    Ok(Command::Refresh) => {
                        log::debug!(target: "featureprobe", "synchronizer thread woken up to refresh");
                    }
                    Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                        log::debug!(target: "featureprobe", "synchronizer thread received stop command");
                        return;
                    }
                }
            })?;

        *thread = Some(PollerThread {
            join_handle,
            command_sender,
        });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let thread = self
            .thread
            .lock()
            .map_err(|_| Error::SynchronizerThreadPanicked)?
            .take();
        let Some(thread) = thread else {
            return Ok(());
        };

        // Error means that the receiver was dropped (thread exited).
        let _ = thread.command_sender.send(Command::Stop);
        thread
            .join_handle
            .join()
            .map_err(|_| Error::SynchronizerThreadPanicked)
    }

    fn initialized(&self) -> bool {
        self.first_result
            .0
            .lock()
            .map(|result| result.is_some())
            .unwrap_or(false)
    }

    fn wait_for_initialization(&self, timeout: Duration) -> Result<bool> {
        wait_first_result(&self.first_result, timeout, Error::SynchronizerThreadPanicked)
    }
}

fn poll(config: &PollingSynchronizerConfig) -> Result<()> {
    log::debug!(target: "featureprobe", "fetching toggles");
    let response = config.client.get(config.toggles_url.clone()).send()?;

    match response.status() {
        status if status.is_success() => {
            let repository: Repository = response.json()?;
            log::debug!(target: "featureprobe",
                        toggles = repository.toggles.len(),
                        segments = repository.segments.len();
                        "successfully fetched toggles");
            config.repository.refresh(repository);
            Ok(())
        }
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        status => Err(Error::Http(status)),
    }
}

/// Apply a random jitter to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    interval + thread_rng().gen_range(Duration::ZERO..=jitter)
}

/// Polls FeatureProbe server like [`PollingSynchronizer`], and refreshes right away whenever the
/// server pushes a toggle update over socket.io.
///
/// If the realtime connection cannot be established, synchronization continues by polling only.
pub struct StreamingSynchronizer {
    polling: Arc<PollingSynchronizer>,
    realtime_url: Url,
    sdk_key: String,
    socket: Mutex<Option<SocketClient>>,
}

impl StreamingSynchronizer {
    pub(crate) fn new(
        polling: PollingSynchronizer,
        realtime_url: Url,
        sdk_key: impl Into<String>,
    ) -> StreamingSynchronizer {
        StreamingSynchronizer {
            polling: Arc::new(polling),
            realtime_url,
            sdk_key: sdk_key.into(),
            socket: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<()> {
        let mut socket = self
            .socket
            .lock()
            .map_err(|_| Error::SynchronizerThreadPanicked)?;
        if socket.is_some() {
            return Ok(());
        }

        // The URL path is both the socket.io path and the namespace.
        let path = self.realtime_url.path().to_owned();
        let sdk_key = self.sdk_key.clone();
        let polling = self.polling.clone();

        log::info!(target: "featureprobe",
                   realtime_url:display = self.realtime_url;
                   "connecting to realtime toggle updates");
        let connected = ClientBuilder::new(self.realtime_url.as_str())
            .namespace(path)
            .transport_type(TransportType::Websocket)
            .on("open", move |_: Payload, socket: RawClient| {
                log::info!(target: "featureprobe", "connected to realtime toggle updates");
                if let Err(err) = socket.emit("register", json!({ "key": sdk_key.as_str() })) {
                    log::warn!(target: "featureprobe", err:display; "failed to register for realtime toggle updates");
                }
            })
            .on("update", move |_: Payload, _: RawClient| refresh_on_push(&polling))
            .on("error", |err: Payload, _: RawClient| {
                log::warn!(target: "featureprobe", err:debug; "realtime connection error");
            })
            .connect();

        match connected {
            Ok(client) => *socket = Some(client),
            Err(err) => {
                log::error!(target: "featureprobe",
                            err:display;
                            "failed to connect to realtime toggle updates, polling only");
            }
        }
        Ok(())
    }
}

fn refresh_on_push(polling: &PollingSynchronizer) {
    log::info!(target: "featureprobe", "received realtime toggle update");
    polling.refresh_now();
}

impl Synchronizer for StreamingSynchronizer {
    fn sync(&self) -> Result<()> {
        self.connect()?;
        self.polling.sync()
    }

    fn close(&self) -> Result<()> {
        let socket = self
            .socket
            .lock()
            .map_err(|_| Error::SynchronizerThreadPanicked)?
            .take();
        if let Some(socket) = socket {
            if let Err(err) = socket.disconnect() {
                log::debug!(target: "featureprobe", err:display; "error while disconnecting realtime socket");
            }
        }
        self.polling.close()
    }

    fn initialized(&self) -> bool {
        self.polling.initialized()
    }

    fn wait_for_initialization(&self, timeout: Duration) -> Result<bool> {
        self.polling.wait_for_initialization(timeout)
    }
}

/// Loads toggles from a repository JSON file, once.
pub struct FileSynchronizer {
    repository: Arc<dyn DataRepository>,
    path: PathBuf,
    first_result: FirstResult,
}

impl FileSynchronizer {
    pub(crate) fn new(repository: Arc<dyn DataRepository>, path: PathBuf) -> FileSynchronizer {
        FileSynchronizer {
            repository,
            path,
            first_result: new_first_result(),
        }
    }

    fn load(&self) -> Result<()> {
        let json = std::fs::read_to_string(&self.path)?;
        let repository = Repository::from_json(&json)?;
        self.repository.refresh(repository);
        Ok(())
    }
}

impl Synchronizer for FileSynchronizer {
    fn sync(&self) -> Result<()> {
        let result = self.load();
        if let Err(err) = &result {
            log::error!(target: "featureprobe",
                        path:debug = self.path,
                        err:display;
                        "failed to load repository file");
        }
        set_first_result(&self.first_result, result);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn initialized(&self) -> bool {
        self.first_result
            .0
            .lock()
            .map(|result| result.is_some())
            .unwrap_or(false)
    }

    fn wait_for_initialization(&self, timeout: Duration) -> Result<bool> {
        wait_first_result(&self.first_result, timeout, Error::SynchronizerThreadPanicked)
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc, time::Duration};

    use super::{
        jitter, refresh_on_push, FileSynchronizer, PollingSynchronizer, PollingSynchronizerConfig,
        StreamingSynchronizer, Synchronizer,
    };
    use crate::data_repository::{DataRepository, MemoryDataRepository};
    use crate::test_server::TestServer;
    use crate::{Error, HttpConfig};

    fn polling(
        server: &TestServer,
        repository: Arc<MemoryDataRepository>,
        refresh_interval: Duration,
    ) -> PollingSynchronizer {
        PollingSynchronizer::new(PollingSynchronizerConfig {
            repository,
            client: HttpConfig::default().build_client("server-key").unwrap(),
            toggles_url: server.url("/api/server-sdk/toggles").parse().unwrap(),
            refresh_interval,
            refresh_jitter: Duration::ZERO,
        })
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let interval = Duration::from_secs(5);
        assert_eq!(jitter(interval, Duration::ZERO), interval);
        for _ in 0..100 {
            let value = jitter(interval, Duration::from_secs(1));
            assert!(value >= interval && value <= interval + Duration::from_secs(1));
        }
    }

    #[test]
    fn polls_toggles() {
        let json = std::fs::read_to_string("tests/data/repo.json").unwrap();
        let server = TestServer::start(200, json);
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer = polling(&server, repository.clone(), Duration::from_millis(50));

        synchronizer.sync().unwrap();
        assert!(synchronizer.wait_for_initialization(Duration::from_secs(5)).unwrap());
        assert!(synchronizer.initialized());
        assert!(repository.get_toggle("promotion_activity").is_some());

        let requests = server.wait_for_requests(2, Duration::from_secs(5));
        assert!(requests.len() >= 2);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/api/server-sdk/toggles");
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("server-key")
        );

        synchronizer.close().unwrap();
        // closing twice is fine
        synchronizer.close().unwrap();
    }

    #[test]
    fn unauthorized_stops_polling() {
        let server = TestServer::start(401, "");
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer = polling(&server, repository.clone(), Duration::from_millis(20));

        synchronizer.sync().unwrap();
        assert!(matches!(
            synchronizer.wait_for_initialization(Duration::from_secs(5)),
            Err(Error::Unauthorized)
        ));
        assert!(!repository.initialized());

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(server.requests().len(), 1);
        synchronizer.close().unwrap();
    }

    #[test]
    fn server_errors_are_retried() {
        let server = TestServer::start(500, "");
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer = polling(&server, repository.clone(), Duration::from_millis(20));

        synchronizer.sync().unwrap();
        assert!(!synchronizer.wait_for_initialization(Duration::from_millis(200)).unwrap());
        assert!(synchronizer.initialized());
        assert!(server.wait_for_requests(3, Duration::from_secs(5)).len() >= 3);
        assert!(!repository.initialized());
        synchronizer.close().unwrap();
    }

    #[test]
    fn wait_times_out_without_sync() {
        let server = TestServer::start(200, "{}");
        let synchronizer = polling(
            &server,
            Arc::new(MemoryDataRepository::new()),
            Duration::from_secs(60),
        );
        assert!(!synchronizer.initialized());
        assert!(!synchronizer.wait_for_initialization(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn refresh_now_polls_before_interval() {
        let json = std::fs::read_to_string("tests/data/repo.json").unwrap();
        let server = TestServer::start(200, json);
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer = polling(&server, repository, Duration::from_secs(60));

        // Not started yet.
        synchronizer.refresh_now();

        synchronizer.sync().unwrap();
        assert!(synchronizer.wait_for_initialization(Duration::from_secs(5)).unwrap());
        assert_eq!(server.wait_for_requests(1, Duration::from_secs(5)).len(), 1);

        synchronizer.refresh_now();
        assert_eq!(server.wait_for_requests(2, Duration::from_secs(5)).len(), 2);

        synchronizer.close().unwrap();
        synchronizer.refresh_now();
    }

    #[test]
    fn streaming_push_triggers_refresh() {
        let json = std::fs::read_to_string("tests/data/repo.json").unwrap();
        let server = TestServer::start(200, json);
        let repository = Arc::new(MemoryDataRepository::new());
        // Nothing listens on the realtime URL: the synchronizer keeps polling.
        let synchronizer = StreamingSynchronizer::new(
            polling(&server, repository.clone(), Duration::from_secs(60)),
            "http://127.0.0.1:1/realtime".parse().unwrap(),
            "server-key",
        );

        synchronizer.sync().unwrap();
        assert!(synchronizer.wait_for_initialization(Duration::from_secs(5)).unwrap());
        assert!(synchronizer.initialized());
        assert!(repository.get_toggle("promotion_activity").is_some());
        assert_eq!(server.wait_for_requests(1, Duration::from_secs(5)).len(), 1);

        refresh_on_push(&synchronizer.polling);
        let requests = server.wait_for_requests(2, Duration::from_secs(5));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].path, "/api/server-sdk/toggles");

        synchronizer.close().unwrap();
        synchronizer.close().unwrap();
    }

    #[test]
    fn loads_file() {
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer =
            FileSynchronizer::new(repository.clone(), PathBuf::from("tests/data/repo.json"));

        synchronizer.sync().unwrap();

        assert!(synchronizer.wait_for_initialization(Duration::ZERO).unwrap());
        assert!(repository.get_toggle("promotion_activity").is_some());
        synchronizer.close().unwrap();
    }

    #[test]
    fn missing_file_leaves_repository_uninitialized() {
        let repository = Arc::new(MemoryDataRepository::new());
        let synchronizer =
            FileSynchronizer::new(repository.clone(), PathBuf::from("tests/data/missing.json"));

        synchronizer.sync().unwrap();

        assert!(synchronizer.initialized());
        assert!(!synchronizer.wait_for_initialization(Duration::ZERO).unwrap());
        assert!(!repository.initialized());
    }
}
