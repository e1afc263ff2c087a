//! # wagate-sessions
//!
//! Session lifecycle for the gateway: one client handle per session id, the
//! readiness state machine each handle moves through, the request-time wait
//! for readiness, outbound dispatch, and the inbound trigger auto-reply.
//!
//! ```text
//! request ─→ SessionGateway ─→ SessionRegistry::get_or_create ─→ ClientHandle
//!                 │                                                   │
//!                 ├─→ ReadinessCoordinator::await_ready ◀── state ────┤
//!                 │                                                   │
//!                 └─→ MessageDispatcher::send ─────────────→ ChatClient
//!
//! ChatClient events ─→ lifecycle driver ─→ ClientHandle state / SessionStore / registry
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod gateway;
pub mod handle;
pub mod registry;
pub mod responder;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use coordinator::{ReadinessCoordinator, ReadyOutcome};
pub use dispatcher::MessageDispatcher;
pub use gateway::SessionGateway;
pub use handle::{ClientHandle, ClientState};
pub use registry::SessionRegistry;
pub use responder::TriggerResponder;
