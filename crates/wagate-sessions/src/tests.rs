use crate::handle::{ClientHandle, ClientState};
use crate::registry::SessionRegistry;
use crate::responder::TriggerResponder;
use crate::testing::{
    entry, inbound, wait_until, Journal, JournalStore, MockClient, MockFactory, MockReport, Script,
};
use crate::{MessageDispatcher, SessionGateway};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wagate_core::{
    config::{DisconnectPolicy, SessionConfig},
    error::GatewayError,
    message::{MediaAttachment, OutboundPayload},
    report::ReportLabels,
    traits::{ClientEvent, SessionStore},
};
use wagate_store::MemorySessionStore;

const TO: &str = "6281234@c.us";

fn labels() -> ReportLabels {
    ReportLabels {
        group: "Asrama".into(),
        no_class: "Tidak Sekolah".into(),
    }
}

fn text(body: &str) -> OutboundPayload {
    OutboundPayload::Text(body.to_string())
}

struct Fixture {
    gateway: Arc<SessionGateway>,
    factory: Arc<MockFactory>,
    store: Arc<MemorySessionStore>,
}

fn fixture_with(
    factory: MockFactory,
    policy: DisconnectPolicy,
    timeout: Duration,
    responder: Option<Arc<TriggerResponder>>,
) -> Fixture {
    let factory = Arc::new(factory);
    let store = Arc::new(MemorySessionStore::new());
    let config = SessionConfig {
        on_disconnect: policy,
        ..Default::default()
    };
    let gateway = SessionGateway::new(store.clone(), factory.clone(), responder, &config)
        .with_ready_timeout(timeout);
    Fixture {
        gateway: Arc::new(gateway),
        factory,
        store,
    }
}

fn fixture(script: Script) -> Fixture {
    fixture_with(
        MockFactory::new(script),
        DisconnectPolicy::ClearReady,
        Duration::from_secs(2),
        None,
    )
}

async fn record_ready(store: &MemorySessionStore, id: &str) -> bool {
    store
        .find(id)
        .await
        .unwrap()
        .is_some_and(|record| record.is_ready)
}

// --- Registry ---

#[tokio::test]
async fn test_get_or_create_returns_same_handle() {
    let f = fixture(Script::Silent);
    let registry = f.gateway.registry();

    let a = registry.get_or_create("s1", None).await.unwrap();
    let b = registry.get_or_create("s1", None).await.unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(f.factory.created_count(), 1);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_get_or_create_builds_once() {
    let f = fixture_with(
        MockFactory::new(Script::Silent).with_delay(Duration::from_millis(30)),
        DisconnectPolicy::ClearReady,
        Duration::from_secs(2),
        None,
    );
    let registry: Arc<SessionRegistry> = Arc::clone(f.gateway.registry());

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create("s1", None).await.unwrap() })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(f.factory.created_count(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[tokio::test]
async fn test_terminal_handle_is_replaced() {
    let f = fixture(Script::Silent);
    let registry = f.gateway.registry();

    let first = registry.get_or_create("s1", None).await.unwrap();
    first.transition(ClientState::Disconnected("gone".into()));
    let second = registry.get_or_create("s1", None).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.state(), ClientState::Created);
    assert_eq!(f.factory.created_count(), 2);
}

#[tokio::test]
async fn test_distinct_sessions_get_distinct_clients() {
    let f = fixture(Script::Silent);
    let registry = f.gateway.registry();

    let a = registry.get_or_create("a", Some(b"auth-a".to_vec())).await.unwrap();
    let b = registry.get_or_create("b", None).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    let created = f.factory.created();
    assert_eq!(created[0], ("a".to_string(), Some(b"auth-a".to_vec())));
    assert_eq!(created[1], ("b".to_string(), None));
    let live = registry.live().await;
    assert_eq!(live.len(), 2);
    assert_eq!(live[0].0, "a");
}

// --- Readiness ---

#[tokio::test]
async fn test_send_initializes_and_persists() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();

    let receipt = f.gateway.send("s1", TO, text("hi")).await.unwrap();

    assert_eq!(receipt.to, TO);
    let client = f.factory.client("s1");
    assert_eq!(client.init_count(), 1);
    assert_eq!(client.sent(), vec![(TO.to_string(), text("hi"))]);

    let record = f.store.find("s1").await.unwrap().unwrap();
    assert_eq!(record.auth_state.as_deref(), Some(&b"auth-s1"[..]));
    assert!(record.is_ready);
}

#[tokio::test]
async fn test_ready_client_skips_initialize() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();

    f.gateway.send("s1", TO, text("one")).await.unwrap();
    f.gateway.send("s1", TO, text("two")).await.unwrap();

    let client = f.factory.client("s1");
    assert_eq!(client.init_count(), 1);
    assert_eq!(client.sent().len(), 2);
    assert_eq!(f.factory.created_count(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let f = fixture(Script::ReadyOnInit);

    let err = f.gateway.send("ghost", TO, text("hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::NotFound(id) if id == "ghost"));
    assert_eq!(f.factory.created_count(), 0);
    assert!(f.gateway.registry().is_empty().await);
}

#[tokio::test]
async fn test_auth_failure_returns_before_timeout() {
    let f = fixture_with(
        MockFactory::new(Script::AuthFailOnInit("bad credentials".into())),
        DisconnectPolicy::ClearReady,
        Duration::from_secs(5),
        None,
    );
    f.store.create("s1").await.unwrap();

    let started = Instant::now();
    let err = f.gateway.send("s1", TO, text("hi")).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, GatewayError::AuthFailed(msg) if msg == "bad credentials"));
    assert!(f.factory.client("s1").sent().is_empty());

    let registry = Arc::clone(f.gateway.registry());
    let settled = wait_until(|| {
        let r = Arc::clone(&registry);
        async move { r.get("s1").await.is_none() }
    })
    .await;
    assert!(settled);
    assert!(!record_ready(&f.store, "s1").await);
}

#[tokio::test]
async fn test_rejected_initialize_is_initialization_failure() {
    let f = fixture(Script::FailInit);
    f.store.create("s1").await.unwrap();

    let err = f.gateway.send("s1", TO, text("hi")).await.unwrap_err();

    assert!(err.is_initialization());
    assert!(matches!(err, GatewayError::InitializationFailed(_)));
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let f = fixture_with(
        MockFactory::new(Script::Silent),
        DisconnectPolicy::ClearReady,
        Duration::from_millis(50),
        None,
    );
    f.store.create("s1").await.unwrap();

    let err = f.gateway.send("s1", TO, text("hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::TimedOut(d) if d == Duration::from_millis(50)));
    assert!(f.factory.client("s1").sent().is_empty());
}

#[tokio::test]
async fn test_timed_out_wait_leaves_no_waiter() {
    let f = fixture_with(
        MockFactory::new(Script::Silent),
        DisconnectPolicy::ClearReady,
        Duration::from_millis(50),
        None,
    );
    f.store.create("s1").await.unwrap();

    assert!(f.gateway.send("s1", TO, text("hi")).await.is_err());

    let handle = f.gateway.registry().get("s1").await.unwrap();
    // Only the lifecycle driver still watches the state.
    assert_eq!(handle.receiver_count(), 1);

    // The same client can still come up later.
    let client = f.factory.client("s1");
    client.emit(ClientEvent::Ready).await;
    let h = Arc::clone(&handle);
    let settled = wait_until(|| {
        let h = Arc::clone(&h);
        async move { h.is_ready() }
    })
    .await;
    assert!(settled);

    f.gateway.send("s1", TO, text("again")).await.unwrap();
    assert_eq!(client.init_count(), 1);
    assert_eq!(f.factory.created_count(), 1);
}

#[tokio::test]
async fn test_concurrent_waiters_released_by_one_ready() {
    let f = fixture(Script::Silent);
    f.store.create("s1").await.unwrap();

    let tasks: Vec<_> = (0..3)
        .map(|i| {
            let gateway = Arc::clone(&f.gateway);
            tokio::spawn(async move { gateway.send("s1", TO, text(&format!("m{i}"))).await })
        })
        .collect();

    let factory = Arc::clone(&f.factory);
    let settled = wait_until(|| {
        let factory = Arc::clone(&factory);
        async move { factory.created_count() == 1 && factory.client("s1").init_count() == 1 }
    })
    .await;
    assert!(settled);
    f.factory.client("s1").emit(ClientEvent::Ready).await;

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let client = f.factory.client("s1");
    assert_eq!(client.init_count(), 1);
    assert_eq!(client.sent().len(), 3);
}

#[tokio::test]
async fn test_disconnect_during_wait() {
    let f = fixture(Script::Silent);
    f.store.create("s1").await.unwrap();

    let gateway = Arc::clone(&f.gateway);
    let task = tokio::spawn(async move { gateway.send("s1", TO, text("hi")).await });

    let factory = Arc::clone(&f.factory);
    let settled = wait_until(|| {
        let factory = Arc::clone(&factory);
        async move { factory.created_count() == 1 && factory.client("s1").init_count() == 1 }
    })
    .await;
    assert!(settled);
    f.factory
        .client("s1")
        .emit(ClientEvent::Disconnected("connection lost".into()))
        .await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, GatewayError::Disconnected(reason) if reason == "connection lost"));
}

// --- Disconnect policy ---

#[tokio::test]
async fn test_disconnect_keeps_auth_and_reinitializes() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("hi")).await.unwrap();

    let first = f.factory.client("s1");
    first.emit(ClientEvent::Disconnected("phone offline".into())).await;

    let registry = Arc::clone(f.gateway.registry());
    let settled = wait_until(|| {
        let r = Arc::clone(&registry);
        async move { r.get("s1").await.is_none() }
    })
    .await;
    assert!(settled);
    assert_eq!(first.shutdowns.load(Ordering::SeqCst), 1);

    let record = f.store.find("s1").await.unwrap().unwrap();
    assert!(!record.is_ready);
    assert_eq!(record.auth_state.as_deref(), Some(&b"auth-s1"[..]));

    f.gateway.send("s1", TO, text("back")).await.unwrap();
    let created = f.factory.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[1].1.as_deref(), Some(&b"auth-s1"[..]));
    assert_eq!(f.factory.client("s1").init_count(), 1);
}

#[tokio::test]
async fn test_delete_policy_forgets_session() {
    let f = fixture_with(
        MockFactory::new(Script::ReadyOnInit),
        DisconnectPolicy::Delete,
        Duration::from_secs(2),
        None,
    );
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("hi")).await.unwrap();

    f.factory
        .client("s1")
        .emit(ClientEvent::Disconnected("logged out".into()))
        .await;

    let store = Arc::clone(&f.store);
    let settled = wait_until(|| {
        let s = Arc::clone(&store);
        async move { s.find("s1").await.unwrap().is_none() }
    })
    .await;
    assert!(settled);

    let err = f.gateway.send("s1", TO, text("again")).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(f.factory.created_count(), 1);
}

#[tokio::test]
async fn test_auth_failure_keeps_record_under_delete_policy() {
    let f = fixture_with(
        MockFactory::new(Script::AuthFailOnInit("revoked".into())),
        DisconnectPolicy::Delete,
        Duration::from_secs(2),
        None,
    );
    f.store.create("s1").await.unwrap();

    assert!(f.gateway.send("s1", TO, text("hi")).await.is_err());

    let registry = Arc::clone(f.gateway.registry());
    let settled = wait_until(|| {
        let r = Arc::clone(&registry);
        async move { r.get("s1").await.is_none() }
    })
    .await;
    assert!(settled);
    assert!(f.store.find("s1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_policy_stops_client_before_deleting() {
    let journal = Journal::default();
    let factory =
        Arc::new(MockFactory::new(Script::ReadyOnInit).with_journal(Arc::clone(&journal)));
    let store = Arc::new(JournalStore::new(Arc::clone(&journal)));
    let config = SessionConfig {
        on_disconnect: DisconnectPolicy::Delete,
        ..Default::default()
    };
    let gateway = SessionGateway::new(store.clone(), factory.clone(), None, &config);
    store.create("s1").await.unwrap();
    gateway.send("s1", TO, text("hi")).await.unwrap();

    factory
        .client("s1")
        .emit(ClientEvent::Disconnected("logged out".into()))
        .await;

    let settled = wait_until(|| {
        let s = Arc::clone(&store);
        async move { s.find("s1").await.unwrap().is_none() }
    })
    .await;
    assert!(settled);
    let entries = journal.lock().unwrap().clone();
    assert_eq!(entries, vec!["set_ready s1 true", "shutdown s1", "delete s1"]);
}

#[tokio::test]
async fn test_evicted_handle_still_clears_readiness() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("hi")).await.unwrap();
    assert!(record_ready(&f.store, "s1").await);

    // Replace the handle before its lifecycle driver gets to run.
    let first = f.gateway.registry().get("s1").await.unwrap();
    first.transition(ClientState::Disconnected("phone offline".into()));
    let second = f
        .gateway
        .registry()
        .get_or_create("s1", Some(b"auth-s1".to_vec()))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!record_ready(&f.store, "s1").await);
    let record = f.store.find("s1").await.unwrap().unwrap();
    assert_eq!(record.auth_state.as_deref(), Some(&b"auth-s1"[..]));
    assert_eq!(f.factory.created_count(), 2);
}

#[tokio::test]
async fn test_evicted_handle_is_forgotten_under_delete_policy() {
    let f = fixture_with(
        MockFactory::new(Script::ReadyOnInit),
        DisconnectPolicy::Delete,
        Duration::from_secs(2),
        None,
    );
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("hi")).await.unwrap();
    let first_client = f.factory.client("s1");

    let first = f.gateway.registry().get("s1").await.unwrap();
    first.transition(ClientState::Disconnected("logged out".into()));
    let err = f
        .gateway
        .registry()
        .get_or_create("s1", Some(b"auth-s1".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(f.store.find("s1").await.unwrap().is_none());
    assert_eq!(first_client.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(f.factory.created_count(), 1);

    // Starting again pairs from scratch.
    f.gateway.start_session("s1").await.unwrap();
    let created = f.factory.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[1], ("s1".to_string(), None));
    assert!(f.store.find("s1").await.unwrap().is_some());
}

// --- start_session / forget / shutdown ---

#[tokio::test]
async fn test_start_session_creates_record_and_authenticates() {
    let f = fixture(Script::ReadyOnInit);

    let state = f.gateway.start_session("s9").await.unwrap();
    assert!(!state.is_terminal());
    assert!(f.store.find("s9").await.unwrap().is_some());

    let store = Arc::clone(&f.store);
    let settled = wait_until(|| {
        let s = Arc::clone(&store);
        async move { record_ready(&s, "s9").await }
    })
    .await;
    assert!(settled);
    let record = f.store.find("s9").await.unwrap().unwrap();
    assert_eq!(record.auth_state.as_deref(), Some(&b"auth-s9"[..]));
    assert_eq!(f.factory.client("s9").init_count(), 1);
}

#[tokio::test]
async fn test_start_session_twice_initializes_once() {
    let f = fixture(Script::Silent);

    f.gateway.start_session("s1").await.unwrap();
    let state = f.gateway.start_session("s1").await.unwrap();

    assert_eq!(state, ClientState::Initializing);
    assert_eq!(f.factory.created_count(), 1);
    assert_eq!(f.factory.client("s1").init_count(), 1);
}

#[tokio::test]
async fn test_start_session_rejects_empty_id() {
    let f = fixture(Script::Silent);
    let err = f.gateway.start_session("  ").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
    assert_eq!(f.factory.created_count(), 0);
}

#[tokio::test]
async fn test_qr_is_kept_until_ready() {
    let f = fixture(Script::Silent);
    f.gateway.start_session("s1").await.unwrap();
    let handle = f.gateway.registry().get("s1").await.unwrap();
    let client = f.factory.client("s1");

    client.emit(ClientEvent::Qr("2@abc".into())).await;
    let h = Arc::clone(&handle);
    let settled = wait_until(|| {
        let h = Arc::clone(&h);
        async move { h.last_qr().is_some() }
    })
    .await;
    assert!(settled);
    assert_eq!(handle.last_qr().as_deref(), Some("2@abc"));

    client.emit(ClientEvent::Ready).await;
    let h = Arc::clone(&handle);
    let settled = wait_until(|| {
        let h = Arc::clone(&h);
        async move { h.is_ready() }
    })
    .await;
    assert!(settled);
    assert!(handle.last_qr().is_none());
}

#[tokio::test]
async fn test_forget_removes_everything() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("hi")).await.unwrap();

    f.gateway.forget("s1").await.unwrap();

    assert!(f.store.find("s1").await.unwrap().is_none());
    assert!(f.gateway.registry().get("s1").await.is_none());
    assert!(f.factory.client("s1").shutdowns.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_shutdown_disconnects_every_client() {
    let f = fixture_with(
        MockFactory::new(Script::ReadyOnInit),
        DisconnectPolicy::Delete,
        Duration::from_secs(2),
        None,
    );
    for id in ["a", "b"] {
        f.store.create(id).await.unwrap();
        f.gateway.send(id, TO, text("hi")).await.unwrap();
    }

    f.gateway.shutdown().await;

    assert!(f.gateway.registry().is_empty().await);
    for id in ["a", "b"] {
        assert_eq!(f.factory.client(id).shutdowns.load(Ordering::SeqCst), 1);
        let record = f.store.find(id).await.unwrap().unwrap();
        assert!(!record.is_ready);
        assert!(record.auth_state.is_some());
    }
    let err = f.gateway.send("a", TO, text("late")).await.unwrap_err();
    assert!(err.is_initialization());
}

// --- Dispatch ---

#[tokio::test]
async fn test_send_failure_is_reported_once() {
    let f = fixture(Script::ReadyOnInit);
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("warm up")).await.unwrap();

    let client = f.factory.client("s1");
    client.fail_send.store(true, Ordering::SeqCst);
    let err = f.gateway.send("s1", TO, text("hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::SendFailed(msg) if msg == "recipient unreachable"));
    assert_eq!(client.sent().len(), 2);
}

#[tokio::test]
async fn test_dispatcher_refuses_unready_handle() {
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let client = Arc::new(MockClient::new("s1", Script::Silent, tx));
    let handle = ClientHandle::new("s1", client.clone());

    let err = MessageDispatcher::new()
        .send(&handle, TO, &text("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::SendFailed(msg) if msg.contains("created")));
    assert!(client.sent().is_empty());
}

#[tokio::test]
async fn test_dispatcher_rejects_empty_media() {
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let client = Arc::new(MockClient::new("s1", Script::Silent, tx));
    let handle = ClientHandle::new("s1", client.clone());
    handle.transition(ClientState::Ready);

    let media = OutboundPayload::Media(MediaAttachment {
        data: Vec::new(),
        mime_type: "image/png".into(),
        caption: String::new(),
    });
    let err = MessageDispatcher::new()
        .send(&handle, TO, &media)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidRequest(_)));
    assert!(client.sent().is_empty());
}

// --- Responder ---

fn responder(report: Arc<MockReport>) -> Arc<TriggerResponder> {
    Arc::new(TriggerResponder::new(
        &["uks list".to_string(), "data uks".to_string()],
        report,
        labels(),
    ))
}

#[test]
fn test_trigger_match_is_case_insensitive_prefix() {
    let r = responder(Arc::new(MockReport::rows(Vec::new())));
    assert!(r.matches("UKS List"));
    assert!(r.matches("data uks hari ini"));
    assert!(!r.matches("tolong uks list"));
    assert!(!r.matches("hello"));
}

#[tokio::test]
async fn test_trigger_message_gets_report_reply() {
    let report = Arc::new(MockReport::rows(vec![
        entry("A1", "Budi", &["Demam", "Pusing"], Some("7A")),
        entry("A1", "Sari", &["Batuk"], None),
    ]));
    let f = fixture_with(
        MockFactory::new(Script::ReadyOnInit),
        DisconnectPolicy::ClearReady,
        Duration::from_secs(2),
        Some(responder(Arc::clone(&report))),
    );
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("warm up")).await.unwrap();

    let client = f.factory.client("s1");
    client
        .emit(ClientEvent::Message(inbound("s1", "62899@c.us", "Uks list")))
        .await;

    let c = Arc::clone(&client);
    let settled = wait_until(|| {
        let c = Arc::clone(&c);
        async move { c.sent().len() == 2 }
    })
    .await;
    assert!(settled);
    let (to, payload) = client.sent().pop().unwrap();
    assert_eq!(to, "62899@c.us");
    assert_eq!(
        payload,
        text("*Asrama: A1*\n1. Budi, Demam, Pusing, 7A\n2. Sari, Batuk, Tidak Sekolah\n\n")
    );
}

#[tokio::test]
async fn test_non_trigger_message_is_ignored() {
    let report = Arc::new(MockReport::rows(vec![entry("A1", "Budi", &["Demam"], None)]));
    let r = responder(Arc::clone(&report));
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let client = Arc::new(MockClient::new("s1", Script::Silent, tx));

    let task = r.handle(client.clone(), inbound("s1", "62899@c.us", "hello"));

    assert!(task.is_none());
    assert_eq!(report.fetches.load(Ordering::SeqCst), 0);
    assert!(client.sent().is_empty());
}

#[tokio::test]
async fn test_empty_report_sends_nothing() {
    let report = Arc::new(MockReport::rows(Vec::new()));
    let r = responder(Arc::clone(&report));
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let client = Arc::new(MockClient::new("s1", Script::Silent, tx));

    let task = r.handle(client.clone(), inbound("s1", "62899@c.us", "data uks"));
    task.unwrap().await.unwrap();

    assert_eq!(report.fetches.load(Ordering::SeqCst), 1);
    assert!(client.sent().is_empty());
}

#[tokio::test]
async fn test_failing_report_is_contained() {
    let report = Arc::new(MockReport::failing("report db offline"));
    let f = fixture_with(
        MockFactory::new(Script::ReadyOnInit),
        DisconnectPolicy::ClearReady,
        Duration::from_secs(2),
        Some(responder(Arc::clone(&report))),
    );
    f.store.create("s1").await.unwrap();
    f.gateway.send("s1", TO, text("warm up")).await.unwrap();

    let client = f.factory.client("s1");
    client
        .emit(ClientEvent::Message(inbound("s1", "62899@c.us", "uks list")))
        .await;

    let r = Arc::clone(&report);
    let settled = wait_until(|| {
        let r = Arc::clone(&r);
        async move { r.fetches.load(Ordering::SeqCst) == 1 }
    })
    .await;
    assert!(settled);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(client.sent().len(), 1);
    assert!(f.gateway.registry().get("s1").await.unwrap().is_ready());
    f.gateway.send("s1", TO, text("still fine")).await.unwrap();
}
