//! HTTP server answering every request with a fixed response, for exercising the synchronizer and
//! the event processor.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

struct Responder {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

pub(crate) struct TestServer {
    port: u16,
    requests: Arc<Mutex<Vec<Request>>>,
    // Serves until the server is dropped.
    _runtime: Runtime,
}

impl TestServer {
    /// Answer every request with `status` and `body`.
    pub fn start(status: u16, body: impl Into<String>) -> TestServer {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("featureprobe-test-server")
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let port = listener.local_addr().unwrap().port();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder = Arc::new(Responder {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.into(),
            requests: requests.clone(),
        });
        let app = Router::new().fallback(respond).with_state(responder);
        runtime.spawn(async move { axum::serve(listener, app).await });

        TestServer {
            port,
            requests,
            _runtime: runtime,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Block until at least `count` requests were received, or `timeout` elapses.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<Request> {
        let deadline = Instant::now() + timeout;
        loop {
            let requests = self.requests();
            if requests.len() >= count || Instant::now() >= deadline {
                return requests;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

async fn respond(
    State(responder): State<Arc<Responder>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_owned())))
        .collect();
    responder.requests.lock().unwrap().push(Request {
        method: method.to_string(),
        path: uri.path().to_owned(),
        headers,
        body,
    });

    (
        responder.status,
        [(header::CONTENT_TYPE, "application/json")],
        responder.body.clone(),
    )
}
