//! Readiness state machine: drives clients from creation to ready, persists
//! transitions, and lets requests wait for readiness with a deadline.

use crate::handle::{ClientHandle, ClientState};
use crate::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use wagate_core::{error::GatewayError, traits::ClientEvent};

/// Result of waiting for a client to become ready. Exactly one per wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    TimedOut,
    AuthFailed(String),
    Disconnected(String),
    /// The initialize call itself was rejected.
    Failed(String),
}

impl ReadyOutcome {
    fn from_state(state: &ClientState) -> Option<Self> {
        match state {
            ClientState::Ready => Some(Self::Ready),
            ClientState::AuthFailed(msg) => Some(Self::AuthFailed(msg.clone())),
            ClientState::Disconnected(reason) => Some(Self::Disconnected(reason.clone())),
            ClientState::Failed(reason) => Some(Self::Failed(reason.clone())),
            ClientState::Created | ClientState::Initializing | ClientState::Authenticated => None,
        }
    }

    /// Map to the error a caller should see. `timeout` is reported on `TimedOut`.
    pub fn into_result(self, timeout: Duration) -> Result<(), GatewayError> {
        match self {
            Self::Ready => Ok(()),
            Self::TimedOut => Err(GatewayError::TimedOut(timeout)),
            Self::AuthFailed(msg) => Err(GatewayError::AuthFailed(msg)),
            Self::Disconnected(reason) => Err(GatewayError::Disconnected(reason)),
            Self::Failed(reason) => Err(GatewayError::InitializationFailed(reason)),
        }
    }
}

/// Request-side half of the state machine.
#[derive(Debug, Clone)]
pub struct ReadinessCoordinator {
    timeout: Duration,
}

impl ReadinessCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start initializing `handle` unless someone already has.
    ///
    /// Only the caller that moves the handle out of `Created` calls the
    /// client. A rejected initialize marks the handle `Failed`, which releases
    /// every other waiter.
    pub async fn initialize(&self, handle: &ClientHandle) -> Result<(), GatewayError> {
        if !handle.begin_initialize() {
            return Ok(());
        }

        info!(session_id = handle.session_id(), "initializing client");
        if let Err(e) = handle.client().initialize().await {
            let reason = e.to_string();
            error!(session_id = handle.session_id(), "initialize failed: {reason}");
            handle.transition(ClientState::Failed(reason.clone()));
            return Err(GatewayError::InitializationFailed(reason));
        }
        Ok(())
    }

    /// Wait until `handle` is ready, fails, or the timeout elapses.
    ///
    /// A ready handle returns immediately without touching the client.
    /// Otherwise initialization is started if needed. The subscription is
    /// owned by this call and dropped on return, so a timed-out wait leaves
    /// nothing behind.
    pub async fn await_ready(&self, handle: &ClientHandle) -> ReadyOutcome {
        if handle.is_ready() {
            return ReadyOutcome::Ready;
        }

        // Subscribe before initializing so a fast ready event is not missed.
        let mut state_rx = handle.subscribe();

        if let Err(e) = self.initialize(handle).await {
            return match e {
                GatewayError::InitializationFailed(reason) => ReadyOutcome::Failed(reason),
                other => ReadyOutcome::Failed(other.to_string()),
            };
        }

        match tokio::time::timeout(self.timeout, wait_for_outcome(&mut state_rx)).await {
            Ok(outcome) => {
                debug!(session_id = handle.session_id(), ?outcome, "readiness wait finished");
                outcome
            }
            Err(_) => {
                warn!(
                    session_id = handle.session_id(),
                    "client not ready after {}s",
                    self.timeout.as_secs_f32()
                );
                ReadyOutcome::TimedOut
            }
        }
    }
}

async fn wait_for_outcome(state_rx: &mut watch::Receiver<ClientState>) -> ReadyOutcome {
    loop {
        let outcome = ReadyOutcome::from_state(&state_rx.borrow_and_update());
        if let Some(outcome) = outcome {
            return outcome;
        }
        if state_rx.changed().await.is_err() {
            return ReadyOutcome::Disconnected("client handle dropped".into());
        }
    }
}

/// Event-side half of the state machine. One task per handle, spawned by the
/// registry at construction.
///
/// Applies events in emission order until the handle reaches a terminal
/// state, whether through an event or a rejected initialize, then retires it.
pub(crate) async fn drive_lifecycle(
    registry: Arc<SessionRegistry>,
    handle: Arc<ClientHandle>,
    mut events: mpsc::Receiver<ClientEvent>,
) {
    let mut state_rx = handle.subscribe();

    while !handle.state().is_terminal() {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => apply_event(&registry, &handle, event).await,
                None => {
                    handle.transition(ClientState::Disconnected("event stream closed".into()));
                }
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    retire(&registry, &handle).await;
}

async fn apply_event(registry: &SessionRegistry, handle: &Arc<ClientHandle>, event: ClientEvent) {
    let session_id = handle.session_id();
    match event {
        ClientEvent::Qr(code) => {
            info!(session_id, "pairing code received, waiting for scan");
            debug!("QR data: {code}");
            handle.set_qr(Some(code));
        }
        ClientEvent::Authenticated(blob) => {
            if handle.transition(ClientState::Authenticated) {
                info!(session_id, "authenticated");
            }
            if let Err(e) = registry.store.upsert_auth_state(session_id, &blob).await {
                error!(session_id, "failed to persist auth state: {e}");
            }
        }
        ClientEvent::Ready => {
            handle.set_qr(None);
            if handle.transition(ClientState::Ready) {
                info!(session_id, "client ready");
                if let Err(e) = registry.store.set_ready(session_id, true).await {
                    error!(session_id, "failed to persist readiness: {e}");
                }
            }
        }
        ClientEvent::AuthFailure(msg) => {
            warn!(session_id, "authentication failed: {msg}");
            handle.transition(ClientState::AuthFailed(msg));
        }
        ClientEvent::Disconnected(reason) => {
            warn!(session_id, "client disconnected: {reason}");
            handle.transition(ClientState::Disconnected(reason));
        }
        ClientEvent::Message(message) => {
            if let Some(responder) = &registry.responder {
                responder.handle(Arc::clone(handle.client()), message);
            }
        }
    }
}

/// Remove a terminal handle from the registry and release it, unless it
/// was already replaced or removed.
async fn retire(registry: &SessionRegistry, handle: &Arc<ClientHandle>) {
    // Shutdown already handled every client it drained.
    if registry.is_closing() {
        return;
    }

    if !registry.retire_if_current(handle).await {
        debug!(
            session_id = handle.session_id(),
            "handle already released elsewhere"
        );
    }
}
