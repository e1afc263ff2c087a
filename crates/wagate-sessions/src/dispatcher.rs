//! Outbound sends through a ready client.

use crate::handle::ClientHandle;
use tracing::{info, warn};
use wagate_core::{
    error::GatewayError,
    message::{OutboundPayload, SendReceipt},
};

/// Sends one payload through one ready handle. No retries: a failed send is
/// reported to the caller as-is.
#[derive(Debug, Clone, Default)]
pub struct MessageDispatcher;

impl MessageDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn send(
        &self,
        handle: &ClientHandle,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        if let OutboundPayload::Media(media) = payload {
            if media.data.is_empty() {
                return Err(GatewayError::InvalidRequest("empty media attachment".into()));
            }
        }

        // A disconnect can land between the readiness wait and this call.
        if !handle.is_ready() {
            return Err(GatewayError::SendFailed(format!(
                "session {} is {}",
                handle.session_id(),
                handle.state().label()
            )));
        }

        match handle.client().send(to, payload).await {
            Ok(receipt) => {
                info!(
                    session_id = handle.session_id(),
                    kind = payload.kind(),
                    message_id = %receipt.message_id,
                    "message sent"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    session_id = handle.session_id(),
                    kind = payload.kind(),
                    "send failed: {e}"
                );
                Err(match e {
                    GatewayError::SendFailed(_) => e,
                    other => GatewayError::SendFailed(other.to_string()),
                })
            }
        }
    }
}
