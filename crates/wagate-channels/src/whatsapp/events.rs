//! Incoming WhatsApp message handling: filtering and unwrapping.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;
use wagate_core::message::InboundMessage;

/// Convert a protocol message into an [`InboundMessage`].
///
/// Own messages and messages without text are dropped.
pub(super) fn inbound_message(
    session_id: &str,
    msg: waproto::whatsapp::Message,
    info: wacore::types::message::MessageInfo,
) -> Option<InboundMessage> {
    if info.source.is_from_me {
        return None;
    }

    let text = message_text(&msg)?;

    debug!(
        session_id,
        is_group = info.source.is_group,
        sender = %info.source.sender.user,
        "WA inbound message"
    );

    Some(InboundMessage {
        id: Uuid::new_v4(),
        session_id: session_id.to_string(),
        chat: info.source.chat.to_string(),
        sender: info.source.sender.user.clone(),
        text,
        timestamp: Utc::now(),
        is_group: info.source.is_group,
    })
}

/// The text body of a message, looking through device-sent, ephemeral, and
/// view-once wrappers. Image captions count as text.
pub(super) fn message_text(msg: &waproto::whatsapp::Message) -> Option<String> {
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg);

    inner
        .conversation
        .as_deref()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .or_else(|| inner.image_message.as_ref().and_then(|i| i.caption.as_deref()))
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}
