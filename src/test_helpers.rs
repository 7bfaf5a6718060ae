//! Scripted transport and collaborators shared by coordinator tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::channel::{LogoutChannel, Navigator};
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::request::ApiRequest;
use crate::session::SessionManager;
use crate::state::SessionContext;
use crate::storage::{MemoryStore, SessionPersistence};
use crate::transport::{ApiResponse, Transport};

// =========================================================================
// MockTransport
// =========================================================================

pub enum Reply {
    Respond(u16, Value),
    Fail(String),
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self::Respond(200, body)
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(status, Value::Null)
    }
}

type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Answers every request through `handler` and records what was sent.
pub struct MockTransport {
    handler: Handler,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self { handler: Box::new(handler), delays: HashMap::new(), calls: Mutex::new(Vec::new()) }
    }

    /// Suspend requests to `path` for `delay` before answering.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_owned(), delay);
        self
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }
        match (self.handler)(request) {
            Reply::Respond(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::Fail(message) => Err(AuthError::Network(message)),
        }
    }
}

// =========================================================================
// RecordingNavigator
// =========================================================================

/// Forwards every navigation to a channel so tests can await it.
pub struct RecordingNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl RecordingNavigator {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        let _ = self.tx.send(path.to_owned());
    }
}

/// Wait for the next navigation, failing the test after one second.
pub async fn next_navigation(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("navigation timed out")
        .expect("navigator dropped")
}

// =========================================================================
// Builders
// =========================================================================

pub fn test_context(store: &MemoryStore) -> SessionContext {
    SessionContext::new(SessionPersistence::new(Arc::new(store.clone()), "auth"))
}

pub fn test_manager(transport: Arc<MockTransport>) -> SessionManager {
    test_manager_with(transport, SessionConfig::default(), MemoryStore::new(), LogoutChannel::new())
}

pub fn test_manager_with(
    transport: Arc<MockTransport>,
    config: SessionConfig,
    store: MemoryStore,
    channel: LogoutChannel,
) -> SessionManager {
    SessionManager::new(config, transport, Arc::new(store), channel)
}
