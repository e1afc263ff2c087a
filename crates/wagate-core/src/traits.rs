use crate::{
    error::GatewayError,
    message::{InboundMessage, OutboundPayload, SendReceipt, SessionRecord},
    report::ReportEntry,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle and inbound events emitted by a chat client, in emission order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A pairing code to be scanned with the phone.
    Qr(String),
    /// Credentials were exchanged; carries the opaque auth blob to persist.
    Authenticated(Vec<u8>),
    /// The client can send and receive.
    Ready,
    /// Credentials were rejected.
    AuthFailure(String),
    /// The connection is gone.
    Disconnected(String),
    /// A message arrived.
    Message(InboundMessage),
}

/// Sending half of a client's event stream.
pub type EventSender = mpsc::Sender<ClientEvent>;

/// Messaging protocol client: one live connection for one session.
///
/// Implementations report lifecycle changes through the [`EventSender`] they
/// were created with, never by return value.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Session this client is bound to.
    fn session_id(&self) -> &str;

    /// Connect and start authenticating. Returns once the attempt is under way.
    async fn initialize(&self) -> Result<(), GatewayError>;

    /// Send one payload to a recipient address.
    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError>;

    /// Drop the connection and release background work.
    async fn shutdown(&self) -> Result<(), GatewayError>;
}

/// Builds chat clients bound to a session id.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Construct (but do not initialize) a client for `session_id`.
    ///
    /// `auth_state` is the last persisted auth blob, if any. Distinct session
    /// ids must never share credentials.
    async fn create(
        &self,
        session_id: &str,
        auth_state: Option<Vec<u8>>,
        events: EventSender,
    ) -> Result<Arc<dyn ChatClient>, GatewayError>;
}

/// Durable session records keyed by session id.
///
/// Connectivity failures surface as [`GatewayError::DataStoreUnavailable`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a record. Absence is `Ok(None)`, not an error.
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError>;

    /// Insert an empty record if none exists.
    async fn create(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Create or overwrite the auth blob for a session.
    async fn upsert_auth_state(&self, session_id: &str, blob: &[u8])
        -> Result<(), GatewayError>;

    /// Update the readiness flag. No-op when the record is absent.
    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), GatewayError>;

    /// Remove the record entirely.
    async fn delete(&self, session_id: &str) -> Result<(), GatewayError>;

    /// All records, ordered by session id.
    async fn list(&self) -> Result<Vec<SessionRecord>, GatewayError>;
}

/// Source of the report sent by the inbound auto-reply.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ReportEntry>, GatewayError>;
}
