//! Entry points used by the HTTP layer and the CLI.

use crate::coordinator::ReadinessCoordinator;
use crate::dispatcher::MessageDispatcher;
use crate::handle::ClientState;
use crate::registry::SessionRegistry;
use crate::responder::TriggerResponder;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wagate_core::{
    config::SessionConfig,
    error::GatewayError,
    message::{OutboundPayload, SendReceipt, SessionRecord},
    traits::{ClientFactory, SessionStore},
};

/// Composes the registry, the readiness wait, and the dispatcher.
pub struct SessionGateway {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn SessionStore>,
    coordinator: ReadinessCoordinator,
    dispatcher: MessageDispatcher,
}

impl SessionGateway {
    pub fn new(
        store: Arc<dyn SessionStore>,
        factory: Arc<dyn ClientFactory>,
        responder: Option<Arc<TriggerResponder>>,
        config: &SessionConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            factory,
            Arc::clone(&store),
            responder,
            config.on_disconnect,
        ));
        Self {
            registry,
            store,
            coordinator: ReadinessCoordinator::new(config.ready_timeout()),
            dispatcher: MessageDispatcher::new(),
        }
    }

    /// Override the readiness wait configured in seconds.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator = ReadinessCoordinator::new(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &ReadinessCoordinator {
        &self.coordinator
    }

    /// Create the durable record if needed, build the client, and start
    /// initializing it. Does not wait for readiness.
    pub async fn start_session(&self, session_id: &str) -> Result<ClientState, GatewayError> {
        validate_session_id(session_id)?;

        let auth_state = match self.store.find(session_id).await? {
            Some(record) => {
                info!(session_id, "using existing session");
                record.auth_state
            }
            None => {
                info!(session_id, "creating new session");
                self.store.create(session_id).await?;
                None
            }
        };

        let handle = match self.registry.get_or_create(session_id, auth_state).await {
            // The previous client disconnected and its record was forgotten.
            Err(GatewayError::NotFound(_)) => {
                info!(session_id, "previous session forgotten, starting over");
                self.store.create(session_id).await?;
                self.registry.get_or_create(session_id, None).await?
            }
            other => other?,
        };
        self.coordinator.initialize(&handle).await?;
        Ok(handle.state())
    }

    /// Send `payload` to `to` through `session_id`, waiting for the client to
    /// become ready first.
    ///
    /// Fails with [`GatewayError::NotFound`] before any client is built when
    /// the session has no durable record.
    pub async fn send(
        &self,
        session_id: &str,
        to: &str,
        payload: OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        validate_session_id(session_id)?;

        let record = self
            .store
            .find(session_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(session_id.to_string()))?;

        let handle = self
            .registry
            .get_or_create(session_id, record.auth_state)
            .await?;

        self.coordinator
            .await_ready(&handle)
            .await
            .into_result(self.coordinator.timeout())?;

        self.dispatcher.send(&handle, to, &payload).await
    }

    /// Durable records, for listing.
    pub async fn sessions(&self) -> Result<Vec<SessionRecord>, GatewayError> {
        self.store.list().await
    }

    /// Stop the live client (if any) and delete the durable record.
    pub async fn forget(&self, session_id: &str) -> Result<(), GatewayError> {
        if let Some(handle) = self.registry.remove(session_id).await {
            handle.transition(ClientState::Disconnected("session forgotten".into()));
            handle.client().shutdown().await?;
        }
        self.store.delete(session_id).await?;
        info!(session_id, "session forgotten");
        Ok(())
    }

    /// Graceful teardown: disconnect every live client.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

fn validate_session_id(session_id: &str) -> Result<(), GatewayError> {
    if session_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "sessionId must not be empty".into(),
        ));
    }
    Ok(())
}
