//! Inbound trigger auto-reply.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use wagate_core::{
    error::GatewayError,
    message::{InboundMessage, OutboundPayload, SendReceipt},
    report::{format_report, group_entries, ReportLabels},
    traits::{ChatClient, ReportSource},
};

/// Replies with a formatted report when an inbound message starts with one
/// of the trigger phrases.
pub struct TriggerResponder {
    triggers: Vec<String>,
    source: Arc<dyn ReportSource>,
    labels: ReportLabels,
}

impl TriggerResponder {
    pub fn new(triggers: &[String], source: Arc<dyn ReportSource>, labels: ReportLabels) -> Self {
        Self {
            triggers: triggers
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            source,
            labels,
        }
    }

    /// Case-insensitive prefix match against the trigger phrases.
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.triggers.iter().any(|t| lower.starts_with(t.as_str()))
    }

    /// Spawn a detached reply task if `message` is a trigger.
    ///
    /// Failures are logged inside the task and never reach the caller.
    pub fn handle(
        self: &Arc<Self>,
        client: Arc<dyn ChatClient>,
        message: InboundMessage,
    ) -> Option<JoinHandle<()>> {
        if !self.matches(&message.text) {
            return None;
        }

        let responder = Arc::clone(self);
        Some(tokio::spawn(async move {
            match responder.reply(client.as_ref(), &message).await {
                Ok(Some(receipt)) => {
                    info!(
                        session_id = %message.session_id,
                        chat = %message.chat,
                        message_id = %receipt.message_id,
                        "report reply sent"
                    );
                }
                Ok(None) => debug!(session_id = %message.session_id, "report empty, no reply"),
                Err(e) => error!(session_id = %message.session_id, "report reply failed: {e}"),
            }
        }))
    }

    async fn reply(
        &self,
        client: &dyn ChatClient,
        message: &InboundMessage,
    ) -> Result<Option<SendReceipt>, GatewayError> {
        let entries = self.source.fetch().await?;
        let text = format_report(&group_entries(entries), &self.labels);
        if text.is_empty() {
            return Ok(None);
        }
        let receipt = client
            .send(&message.chat, &OutboundPayload::Text(text))
            .await?;
        Ok(Some(receipt))
    }
}
