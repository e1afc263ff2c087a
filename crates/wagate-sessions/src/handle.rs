//! One live client per session, plus the state it has reached.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use wagate_core::traits::ChatClient;

/// Where a client is in its lifecycle.
///
/// ```text
/// Created ──→ Initializing ──→ Authenticated ──→ Ready
///    │             │                 │             │
///    └─────────────┴──→ Disconnected ◀─────────────┘
///                  │                 │
///                  ├──→ AuthFailed ◀─┘
///                  └──→ Failed (initialize rejected)
/// ```
///
/// The last three are terminal: a handle that reaches one is retired and the
/// next request builds a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ClientState {
    Created,
    Initializing,
    Authenticated,
    Ready,
    AuthFailed(String),
    Disconnected(String),
    Failed(String),
}

impl ClientState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed(_) | Self::Disconnected(_) | Self::Failed(_)
        )
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailed(_) => "auth_failed",
            Self::Disconnected(_) => "disconnected",
            Self::Failed(_) => "failed",
        }
    }
}

/// A constructed client bound to one session id.
///
/// State changes are published on a watch channel, so any number of waiters
/// observe the same transition.
pub struct ClientHandle {
    session_id: String,
    client: Arc<dyn ChatClient>,
    state: watch::Sender<ClientState>,
    last_qr: watch::Sender<Option<String>>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("session_id", &self.session_id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    pub(crate) fn new(session_id: &str, client: Arc<dyn ChatClient>) -> Self {
        Self {
            session_id: session_id.to_string(),
            client,
            state: watch::Sender::new(ClientState::Created),
            last_qr: watch::Sender::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), ClientState::Ready)
    }

    /// A receiver scoped to one waiter. Dropping it deregisters the waiter.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn receiver_count(&self) -> usize {
        self.state.receiver_count()
    }

    /// Most recent pairing code, cleared once the client is ready.
    pub fn last_qr(&self) -> Option<String> {
        self.last_qr.borrow().clone()
    }

    pub(crate) fn set_qr(&self, code: Option<String>) {
        self.last_qr.send_replace(code);
    }

    /// Move `Created → Initializing`. Returns true only for the caller that
    /// performed the move, which then owns the initialize call.
    pub(crate) fn begin_initialize(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ClientState::Created {
                *state = ClientState::Initializing;
                true
            } else {
                false
            }
        })
    }

    /// Apply a transition. Terminal states are final, and a late
    /// `Authenticated` never demotes a ready client.
    pub(crate) fn transition(&self, next: ClientState) -> bool {
        self.state.send_if_modified(|state| {
            let allowed = !state.is_terminal()
                && *state != next
                && !(*state == ClientState::Ready && next == ClientState::Authenticated);
            if allowed {
                *state = next;
            }
            allowed
        })
    }
}
