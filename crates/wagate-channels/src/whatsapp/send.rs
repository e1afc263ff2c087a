//! Outbound message building: recipient addresses and protocol payloads.

use wacore_binary::jid::Jid;
use wagate_core::{
    error::GatewayError,
    message::{ButtonMenu, MediaAttachment},
};
use waproto::whatsapp::message::{buttons_message, ButtonsMessage, ImageMessage};
use waproto::whatsapp::Message;
use whatsapp_rust::client::Client;

/// Server for personal chats.
const USER_SERVER: &str = "s.whatsapp.net";

/// Parse a recipient address into a JID.
///
/// Accepts the legacy `number@c.us` form, a full JID, or a bare number.
pub fn to_jid(address: &str) -> Result<Jid, GatewayError> {
    let address = address.trim();
    let full = match address.split_once('@') {
        Some((user, "c.us")) => format!("{user}@{USER_SERVER}"),
        Some(_) => address.to_string(),
        None => format!("{address}@{USER_SERVER}"),
    };
    full.parse()
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid recipient '{address}': {e}")))
}

pub(super) fn text_message(text: &str) -> Message {
    Message {
        conversation: Some(text.to_string()),
        ..Default::default()
    }
}

/// A quick-reply buttons message. Button ids are their 1-based positions.
pub(super) fn buttons_message(menu: &ButtonMenu) -> Message {
    let buttons = menu
        .buttons
        .iter()
        .enumerate()
        .map(|(i, label)| buttons_message::Button {
            button_id: Some((i + 1).to_string()),
            button_text: Some(buttons_message::button::ButtonText {
                display_text: Some(label.clone()),
            }),
            r#type: Some(buttons_message::button::Type::Response as i32),
            ..Default::default()
        })
        .collect();

    let (header_type, header) = match &menu.title {
        Some(title) => (
            buttons_message::HeaderType::Text,
            Some(buttons_message::Header::Text(title.clone())),
        ),
        None => (buttons_message::HeaderType::Empty, None),
    };

    Message {
        buttons_message: Some(Box::new(ButtonsMessage {
            content_text: Some(menu.body.clone()),
            footer_text: menu.footer.clone(),
            buttons,
            header_type: Some(header_type as i32),
            header,
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Upload image bytes and wrap the result in an image message.
pub(super) async fn upload_image(
    client: &Client,
    media: &MediaAttachment,
) -> Result<Message, GatewayError> {
    let upload = client
        .upload(media.data.clone(), whatsapp_rust::download::MediaType::Image)
        .await
        .map_err(|e| GatewayError::SendFailed(format!("whatsapp image upload failed: {e}")))?;

    Ok(Message {
        image_message: Some(Box::new(ImageMessage {
            mimetype: Some(media.mime_type.clone()),
            caption: (!media.caption.is_empty()).then(|| media.caption.clone()),
            url: Some(upload.url),
            direct_path: Some(upload.direct_path),
            media_key: Some(upload.media_key),
            file_enc_sha256: Some(upload.file_enc_sha256),
            file_sha256: Some(upload.file_sha256),
            file_length: Some(upload.file_length),
            ..Default::default()
        })),
        ..Default::default()
    })
}
