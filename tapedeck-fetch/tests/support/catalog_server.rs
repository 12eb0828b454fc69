//! Local HTTP catalog fixture
//!
//! Serves registered bodies by decoded request path, answers 404 for
//! everything else, and records every request so tests can assert how many
//! fetches a run performed.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MANIFEST_PATH: &str = "/sodlr/albumData.js";

#[derive(Default)]
struct ServerState {
    files: Mutex<HashMap<String, Vec<u8>>>,
    hits: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
    path_delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct CatalogServer {
    pub origin: String,
    state: Arc<ServerState>,
}

async fn serve_path(State(state): State<Arc<ServerState>>, uri: Uri) -> (StatusCode, Vec<u8>) {
    let path = urlencoding::decode(uri.path())
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| uri.path().to_string());

    *state.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let path_delay = state.path_delays.lock().unwrap().get(&path).copied();
    let delay = path_delay.or(*state.delay.lock().unwrap());
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let body = state.files.lock().unwrap().get(&path).cloned();
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    match body {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::NOT_FOUND, b"not found".to_vec()),
    }
}

impl CatalogServer {
    /// Bind to an ephemeral local port and serve in the background
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new().fallback(serve_path).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            origin: format!("http://{}/", addr),
            state,
        }
    }

    /// Register a body under its decoded path (`/music/Song: One?.m4a`)
    pub fn add(&self, path: &str, body: Vec<u8>) {
        self.state.files.lock().unwrap().insert(path.to_string(), body);
    }

    pub fn set_manifest(&self, text: &str) {
        self.add(MANIFEST_PATH, text.as_bytes().to_vec());
    }

    /// Hold every response for `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    /// Hold responses for one decoded path only
    pub fn set_path_delay(&self, path: &str, delay: Duration) {
        self.state
            .path_delays
            .lock()
            .unwrap()
            .insert(path.to_string(), delay);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Requests for anything other than the manifest
    pub fn resource_hits(&self) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.as_str() != MANIFEST_PATH)
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Absolute URL for a decoded path, as the catalog parser would build it
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path.trim_start_matches('/'))
    }
}
