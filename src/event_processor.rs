use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError},
        Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use serde::Serialize;
use url::Url;

use crate::{access_recorder::AccessRecorder, event::Event, Error, Result};

/// Queue capacity. Events pushed to a full queue are dropped.
const CAPACITY: usize = 10_000;

const LOG_BUSY_EVENT: &str = "Event processing is busy, some will be dropped";

pub(crate) struct EventProcessorConfig {
    pub client: reqwest::blocking::Client,
    pub event_url: Url,
    pub flush_interval: Duration,
}

enum EventAction {
    Event(Event),
    Flush,
    Shutdown,
}

/// Events and access counters collected since the last delivery. Delivered as a one-element
/// JSON array.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventRepository {
    events: Vec<Event>,
    access: AccessRecorder,
}

impl EventRepository {
    fn add(&mut self, event: Event) {
        match event {
            Event::Access(access) => {
                self.access.add(&access);
                if access.track_access_events {
                    self.events.push(Event::Access(access));
                }
            }
            event @ Event::Custom(_) => self.events.push(event),
        }
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.access.is_empty()
    }

    /// Move the collected data out, leaving the repository empty.
    fn take(&mut self) -> EventRepository {
        let repository = EventRepository {
            events: std::mem::take(&mut self.events),
            access: self.access.snapshot(),
        };
        self.access.clear();
        repository
    }
}

/// Background thread that aggregates events and periodically posts them to FeatureProbe server.
pub struct EventProcessor {
    sender: SyncSender<EventAction>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl EventProcessor {
    pub(crate) fn start(config: EventProcessorConfig) -> Result<EventProcessor> {
        let (sender, receiver) = sync_channel(CAPACITY);

        let join_handle = std::thread::Builder::new()
            .name("featureprobe-event-processor".to_owned())
            .spawn(move || run(config, receiver))?;

        Ok(EventProcessor {
            sender,
            join_handle: Mutex::new(Some(join_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue an event. Never blocks: the event is dropped if the queue is full.
    pub fn push(&self, event: Event) {
        self.send(EventAction::Event(event));
    }

    /// Ask the processor thread to deliver collected events now.
    pub fn flush(&self) {
        self.send(EventAction::Flush);
    }

    /// Deliver pending events, stop the processor thread, and block waiting for it to exit.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Error means that the receiver was dropped (thread exited).
        let _ = self.sender.send(EventAction::Shutdown);

        let join_handle = self
            .join_handle
            .lock()
            .map_err(|_| Error::EventProcessorThreadPanicked)?
            .take();
        if let Some(join_handle) = join_handle {
            join_handle
                .join()
                .map_err(|_| Error::EventProcessorThreadPanicked)?;
        }
        Ok(())
    }

    fn send(&self, action: EventAction) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match self.sender.try_send(action) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!(target: "featureprobe", "{}", LOG_BUSY_EVENT),
            Err(TrySendError::Disconnected(_)) => {
                log::debug!(target: "featureprobe", "event processor thread is gone, dropping event")
            }
        }
    }
}

fn run(config: EventProcessorConfig, receiver: Receiver<EventAction>) {
    let mut repository = EventRepository::default();
    let mut next_flush = Instant::now() + config.flush_interval;

    loop {
        // Checked on every iteration so that a steady stream of events cannot starve the timer.
        if Instant::now() >= next_flush {
            deliver(&config, &mut repository);
            next_flush = Instant::now() + config.flush_interval;
        }

        let timeout = next_flush.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(timeout) {
            Ok(EventAction::Event(event)) => repository.add(event),
            Ok(EventAction::Flush) => deliver(&config, &mut repository),
            Ok(EventAction::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                log::debug!(target: "featureprobe", "event processor thread received stop command");
                deliver(&config, &mut repository);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                // Flush on the next iteration.
            }
        }
    }
}

fn deliver(config: &EventProcessorConfig, repository: &mut EventRepository) {
    if repository.is_empty() {
        return;
    }
    let payload = [repository.take()];

    log::debug!(target: "featureprobe",
                events = payload[0].events.len();
                "sending events");
    match config
        .client
        .post(config.event_url.clone())
        .json(&payload)
        .send()
    {
        Ok(response) if response.status().is_success() => {
            log::debug!(target: "featureprobe", "events sent");
        }
        Ok(response) => {
            log::error!(target: "featureprobe",
                        status:display = response.status();
                        "unexpected response from event sender");
        }
        Err(err) => {
            log::error!(target: "featureprobe", err:display; "unexpected error from event sender");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value as Json;

    use super::{EventProcessor, EventProcessorConfig, EventRepository};
    use crate::event::{AccessEvent, CustomEvent, Event};
    use crate::test_server::TestServer;
    use crate::{HttpConfig, Value};

    fn access(key: &str, track_access_events: bool) -> Event {
        Event::Access(AccessEvent {
            time: 1,
            user: "user".to_owned(),
            key: key.to_owned(),
            value: Some(Value::Bool(true)),
            version: Some(1),
            variation_index: Some(0),
            rule_index: Some(0),
            reason: "Rule 0 hit".to_owned(),
            track_access_events,
        })
    }

    fn custom(name: &str) -> Event {
        Event::Custom(CustomEvent {
            time: 1,
            user: "user".to_owned(),
            name: name.to_owned(),
            value: None,
        })
    }

    fn start(server: &TestServer, flush_interval: Duration) -> EventProcessor {
        EventProcessor::start(EventProcessorConfig {
            client: HttpConfig::default().build_client("server-key").unwrap(),
            event_url: server.url("/api/events").parse().unwrap(),
            flush_interval,
        })
        .unwrap()
    }

    #[test]
    fn repository_keeps_full_access_events_only_when_tracked() {
        let mut repository = EventRepository::default();
        assert!(repository.is_empty());

        repository.add(access("counted", false));
        repository.add(access("tracked", true));
        repository.add(custom("purchase"));

        assert_eq!(repository.events.len(), 2);
        assert_eq!(repository.access.counters.len(), 2);

        let taken = repository.take();
        assert!(repository.is_empty());
        assert_eq!(taken.events.len(), 2);
    }

    #[test]
    fn flush_posts_events() {
        let server = TestServer::start(200, "");
        let processor = start(&server, Duration::from_secs(60));

        processor.push(access("toggle", false));
        processor.push(access("toggle", false));
        processor.push(custom("purchase"));
        processor.flush();

        let requests = server.wait_for_requests(1, Duration::from_secs(5));
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/api/events");
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("server-key")
        );

        let body: Json = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body[0]["events"].as_array().unwrap().len(), 1);
        assert_eq!(body[0]["events"][0]["kind"], "custom");
        assert_eq!(body[0]["access"]["counters"]["toggle"][0]["count"], 2);

        processor.shutdown().unwrap();
    }

    #[test]
    fn flushes_periodically() {
        let server = TestServer::start(200, "");
        let processor = start(&server, Duration::from_millis(50));

        processor.push(custom("purchase"));

        let requests = server.wait_for_requests(1, Duration::from_secs(5));
        assert_eq!(requests.len(), 1);

        processor.shutdown().unwrap();
    }

    #[test]
    fn shutdown_delivers_pending_events() {
        let server = TestServer::start(200, "");
        let processor = start(&server, Duration::from_secs(60));

        processor.push(custom("purchase"));
        processor.shutdown().unwrap();

        let requests = server.wait_for_requests(1, Duration::from_secs(5));
        assert_eq!(requests.len(), 1);

        // closed: nothing else is sent
        processor.push(custom("late"));
        processor.flush();
        processor.shutdown().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn nothing_to_send() {
        let server = TestServer::start(200, "");
        let processor = start(&server, Duration::from_secs(60));

        processor.flush();
        processor.shutdown().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(server.requests().is_empty());
    }
}
