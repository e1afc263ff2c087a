//! Scripted client, factory and report source for lifecycle tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wagate_core::{
    error::GatewayError,
    message::{InboundMessage, OutboundPayload, SendReceipt, SessionRecord},
    report::ReportEntry,
    traits::{ChatClient, ClientEvent, ClientFactory, EventSender, ReportSource, SessionStore},
};
use wagate_store::MemorySessionStore;

/// Ordered log of client shutdowns and record writes, shared between a
/// [`MockFactory`] and a [`JournalStore`].
pub type Journal = Arc<Mutex<Vec<String>>>;

/// What a mock client does when initialized.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit a pairing code, then authenticate, then become ready.
    ReadyOnInit,
    /// Reject the credentials.
    AuthFailOnInit(String),
    /// Accept the call and never emit anything.
    Silent,
    /// Reject the initialize call itself.
    FailInit,
}

pub struct MockClient {
    session_id: String,
    script: Script,
    events: EventSender,
    pub init_calls: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub fail_send: AtomicBool,
    pub sent: Mutex<Vec<(String, OutboundPayload)>>,
    journal: Option<Journal>,
}

impl MockClient {
    pub fn new(session_id: &str, script: Script, events: EventSender) -> Self {
        Self {
            session_id: session_id.to_string(),
            script,
            events,
            init_calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            fail_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    pub async fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event).await;
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let events = self.events.clone();
        match &self.script {
            Script::ReadyOnInit => {
                let blob = format!("auth-{}", self.session_id).into_bytes();
                tokio::spawn(async move {
                    let _ = events.send(ClientEvent::Qr("qr-code".into())).await;
                    let _ = events.send(ClientEvent::Authenticated(blob)).await;
                    let _ = events.send(ClientEvent::Ready).await;
                });
            }
            Script::AuthFailOnInit(msg) => {
                let msg = msg.clone();
                tokio::spawn(async move {
                    let _ = events.send(ClientEvent::AuthFailure(msg)).await;
                });
            }
            Script::Silent => {}
            Script::FailInit => {
                return Err(GatewayError::InitializationFailed("browser crashed".into()));
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), payload.clone()));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(GatewayError::SendFailed("recipient unreachable".into()));
        }
        Ok(SendReceipt {
            message_id: format!("msg-{}", self.sent.lock().unwrap().len()),
            to: to.to_string(),
            timestamp: Utc::now(),
        })
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("shutdown {}", self.session_id));
        }
        Ok(())
    }
}

/// Builds [`MockClient`]s and records every construction.
pub struct MockFactory {
    script: Script,
    delay: Option<Duration>,
    journal: Option<Journal>,
    created: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
}

impl MockFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: None,
            journal: None,
            created: Mutex::new(Vec::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Slow construction down so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Log every client shutdown to `journal`.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Every `(session_id, auth_state)` the factory was asked to build.
    pub fn created(&self) -> Vec<(String, Option<Vec<u8>>)> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Most recently built client for `session_id`.
    pub fn client(&self, session_id: &str) -> Arc<MockClient> {
        Arc::clone(&self.clients.lock().unwrap()[session_id])
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn create(
        &self,
        session_id: &str,
        auth_state: Option<Vec<u8>>,
        events: EventSender,
    ) -> Result<Arc<dyn ChatClient>, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut client = MockClient::new(session_id, self.script.clone(), events);
        client.journal = self.journal.clone();
        let client = Arc::new(client);
        self.clients
            .lock()
            .unwrap()
            .insert(session_id.to_string(), Arc::clone(&client));
        self.created
            .lock()
            .unwrap()
            .push((session_id.to_string(), auth_state));
        Ok(client)
    }
}

/// Memory store that logs readiness writes and deletes to a [`Journal`].
pub struct JournalStore {
    inner: MemorySessionStore,
    journal: Journal,
}

impl JournalStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemorySessionStore::new(),
            journal,
        }
    }

    fn log(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl SessionStore for JournalStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        self.inner.find(session_id).await
    }

    async fn create(&self, session_id: &str) -> Result<(), GatewayError> {
        self.inner.create(session_id).await
    }

    async fn upsert_auth_state(&self, session_id: &str, blob: &[u8]) -> Result<(), GatewayError> {
        self.inner.upsert_auth_state(session_id, blob).await
    }

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), GatewayError> {
        self.log(format!("set_ready {session_id} {ready}"));
        self.inner.set_ready(session_id, ready).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), GatewayError> {
        self.log(format!("delete {session_id}"));
        self.inner.delete(session_id).await
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, GatewayError> {
        self.inner.list().await
    }
}

/// Fixed report rows, or a fixed failure.
pub struct MockReport {
    rows: Result<Vec<ReportEntry>, String>,
    pub fetches: AtomicUsize,
}

impl MockReport {
    pub fn rows(rows: Vec<ReportEntry>) -> Self {
        Self {
            rows: Ok(rows),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            rows: Err(msg.to_string()),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReportSource for MockReport {
    async fn fetch(&self) -> Result<Vec<ReportEntry>, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.rows
            .clone()
            .map_err(GatewayError::DataStoreUnavailable)
    }
}

pub fn entry(group: &str, name: &str, complaints: &[&str], class: Option<&str>) -> ReportEntry {
    ReportEntry {
        group: group.to_string(),
        name: name.to_string(),
        complaints: complaints.iter().map(|c| c.to_string()).collect(),
        class: class.map(str::to_string),
    }
}

pub fn inbound(session_id: &str, chat: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: uuid::Uuid::new_v4(),
        session_id: session_id.to_string(),
        chat: chat.to_string(),
        sender: chat.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
        is_group: false,
    }
}

/// Poll `check` every few milliseconds until it holds or a second passes.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
