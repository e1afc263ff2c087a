//! In-memory map from session id to its live client handle.

use crate::coordinator;
use crate::handle::{ClientHandle, ClientState};
use crate::responder::TriggerResponder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::{error, info, warn};
use wagate_core::{
    config::DisconnectPolicy,
    error::GatewayError,
    traits::{ClientFactory, SessionStore},
};

/// Capacity of each client's event stream.
const EVENT_BUFFER: usize = 64;

/// A slot is inserted before construction starts, so concurrent callers for
/// the same session wait on the one in-flight construction.
type Slot = Arc<OnceCell<Arc<ClientHandle>>>;

/// Owns every live [`ClientHandle`] in the process.
///
/// A session id is present while a client exists for it and has not reached
/// a terminal state. Handles are built lazily and at most once per session id.
pub struct SessionRegistry {
    factory: Arc<dyn ClientFactory>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) responder: Option<Arc<TriggerResponder>>,
    pub(crate) on_disconnect: DisconnectPolicy,
    slots: Mutex<HashMap<String, Slot>>,
    closing: AtomicBool,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        store: Arc<dyn SessionStore>,
        responder: Option<Arc<TriggerResponder>>,
        on_disconnect: DisconnectPolicy,
    ) -> Self {
        Self {
            factory,
            store,
            responder,
            on_disconnect,
            slots: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
        }
    }

    /// Return the live handle for `session_id`, constructing one if needed.
    ///
    /// A new client is built with `auth_state` and its lifecycle driver is
    /// spawned before the handle is published. A handle that already reached a
    /// terminal state is released and replaced rather than returned. When that
    /// release deletes the record, the call fails with
    /// [`GatewayError::NotFound`] instead.
    pub async fn get_or_create(
        self: &Arc<Self>,
        session_id: &str,
        auth_state: Option<Vec<u8>>,
    ) -> Result<Arc<ClientHandle>, GatewayError> {
        if self.is_closing() {
            return Err(GatewayError::InitializationFailed(
                "gateway is shutting down".into(),
            ));
        }

        let slot = {
            let mut slots = self.slots.lock().await;
            let stale = slots
                .get(session_id)
                .and_then(|slot| slot.get())
                .filter(|handle| handle.state().is_terminal())
                .map(Arc::clone);
            if let Some(stale) = stale {
                // Evicted before its driver got to it: release it here so the
                // disconnect policy still applies.
                slots.remove(session_id);
                if self.release(&stale).await {
                    return Err(GatewayError::NotFound(session_id.to_string()));
                }
            }
            Arc::clone(slots.entry(session_id.to_string()).or_default())
        };

        let handle = slot
            .get_or_try_init(|| self.construct(session_id, auth_state))
            .await?;
        Ok(Arc::clone(handle))
    }

    async fn construct(
        self: &Arc<Self>,
        session_id: &str,
        auth_state: Option<Vec<u8>>,
    ) -> Result<Arc<ClientHandle>, GatewayError> {
        let resumed = auth_state.is_some();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = self.factory.create(session_id, auth_state, tx).await?;
        let handle = Arc::new(ClientHandle::new(session_id, client));

        tokio::spawn(coordinator::drive_lifecycle(
            Arc::clone(self),
            Arc::clone(&handle),
            rx,
        ));

        info!(session_id, resumed, "client constructed");
        Ok(handle)
    }

    /// The live handle for `session_id`, without constructing one.
    pub async fn get(&self, session_id: &str) -> Option<Arc<ClientHandle>> {
        let slots = self.slots.lock().await;
        slots
            .get(session_id)
            .and_then(|slot| slot.get())
            .map(Arc::clone)
    }

    /// Drop the entry for `session_id`. The next `get_or_create` builds fresh.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<ClientHandle>> {
        let slot = self.slots.lock().await.remove(session_id)?;
        slot.get().map(Arc::clone)
    }

    /// Drop the entry and release the client, but only if the entry still
    /// points at `handle`, so a retiring client never evicts its replacement.
    /// Whoever removed a handle first owns its release.
    pub(crate) async fn retire_if_current(&self, handle: &Arc<ClientHandle>) -> bool {
        let mut slots = self.slots.lock().await;
        let current = slots
            .get(handle.session_id())
            .and_then(|slot| slot.get())
            .is_some_and(|existing| Arc::ptr_eq(existing, handle));
        if current {
            slots.remove(handle.session_id());
            self.release(handle).await;
        }
        current
    }

    /// Shut a terminal client down, then apply the disconnect policy to its
    /// durable record. Returns true when the record was deleted.
    ///
    /// The client stops before the record changes, so a still-running
    /// connection cannot write key material back after a delete.
    async fn release(&self, handle: &ClientHandle) -> bool {
        let session_id = handle.session_id();
        let state = handle.state();

        if let Err(e) = handle.client().shutdown().await {
            warn!(session_id, "client shutdown failed: {e}");
        }

        let forget = matches!(state, ClientState::Disconnected(_))
            && self.on_disconnect == DisconnectPolicy::Delete;
        let persisted = if forget {
            self.store.delete(session_id).await
        } else {
            self.store.set_ready(session_id, false).await
        };
        if let Err(e) = persisted {
            error!(session_id, "failed to update record after {}: {e}", state.label());
        }

        info!(session_id, state = state.label(), forget, "client retired");
        forget
    }

    /// Snapshot of every constructed handle and its state.
    pub async fn live(&self) -> Vec<(String, ClientState)> {
        let slots = self.slots.lock().await;
        let mut out: Vec<(String, ClientState)> = slots
            .iter()
            .filter_map(|(id, slot)| slot.get().map(|h| (id.clone(), h.state())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn len(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Disconnect every client and clear durable readiness flags.
    ///
    /// Records and auth state are kept regardless of the disconnect policy.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let drained: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();

        for (session_id, slot) in drained {
            let Some(handle) = slot.get() else {
                continue;
            };
            handle.transition(ClientState::Disconnected("gateway shutdown".into()));
            if let Err(e) = handle.client().shutdown().await {
                warn!(session_id, "client shutdown failed: {e}");
            }
            if let Err(e) = self.store.set_ready(&session_id, false).await {
                warn!(session_id, "failed to clear readiness on shutdown: {e}");
            }
            info!(session_id, "client stopped");
        }
    }
}
