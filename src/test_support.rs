//! HTTP stub for exercising the client against canned responses.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::api::ApiClient;
use crate::config::Config;
use crate::session::{Session, SessionStore};

type Handler = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query exactly as sent, still percent-encoded.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Arrival and completion of each request, in the order the stub saw them.
/// The index is the request's position in [`StubServer::requests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubEvent {
    Arrived(usize),
    Responded(usize),
}

#[derive(Default)]
struct StubLog {
    requests: Vec<RecordedRequest>,
    events: Vec<StubEvent>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone)]
struct StubState {
    handler: Handler,
    delay: Duration,
    log: Arc<Mutex<StubLog>>,
}

pub struct StubServer {
    pub base_url: String,
    log: Arc<Mutex<StubLog>>,
}

impl StubServer {
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        Self::spawn_with_delay(Duration::ZERO, handler).await
    }

    /// Every response is held back by `delay` before it is sent.
    pub async fn spawn_with_delay<F>(delay: Duration, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let log = Arc::new(Mutex::new(StubLog::default()));
        let state = StubState {
            handler: Arc::new(handler),
            delay,
            log: Arc::clone(&log),
        };
        let app = Router::new().fallback(respond).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubServer {
            base_url: format!("http://{}", addr),
            log,
        }
    }

    /// Replies with `responses` in order, repeating the last one.
    pub async fn spawn_sequence(responses: Vec<(u16, String)>) -> Self {
        let calls = Mutex::new(0usize);
        Self::spawn(move |_| {
            let mut n = calls.lock().unwrap();
            let response = responses[(*n).min(responses.len() - 1)].clone();
            *n += 1;
            response
        })
        .await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn events(&self) -> Vec<StubEvent> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.log.lock().unwrap().max_in_flight
    }

    pub fn config(&self) -> Config {
        Config {
            api_url: self.base_url.clone(),
            ..Config::default()
        }
    }
}

async fn respond(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body,
    };

    let index = {
        let mut log = state.log.lock().unwrap();
        let index = log.requests.len();
        log.requests.push(request.clone());
        log.events.push(StubEvent::Arrived(index));
        log.in_flight += 1;
        log.max_in_flight = log.max_in_flight.max(log.in_flight);
        index
    };

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let (status, payload) = (state.handler)(&request);

    {
        let mut log = state.log.lock().unwrap();
        log.in_flight -= 1;
        log.events.push(StubEvent::Responded(index));
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], payload)
}

pub fn user_session() -> Session {
    Session {
        token: "user-token".to_string(),
        user_id: "5".to_string(),
        username: "alice".to_string(),
        is_admin: false,
    }
}

pub fn admin_session() -> Session {
    Session {
        token: "admin-token".to_string(),
        user_id: "1".to_string(),
        username: "admin".to_string(),
        is_admin: true,
    }
}

pub fn client_with_config(config: &Config, session: Option<Session>) -> ApiClient {
    let store = SessionStore::in_memory().unwrap();
    if let Some(session) = session {
        store.save(&session).unwrap();
    }
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    ApiClient::with_http_client(config, store, http).unwrap()
}

pub fn test_client(server: &StubServer, session: Option<Session>) -> ApiClient {
    client_with_config(&server.config(), session)
}
