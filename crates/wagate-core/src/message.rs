use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// Opaque authentication blob from the last successful login.
    #[serde(skip_serializing)]
    pub auth_state: Option<Vec<u8>>,
    pub is_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh record with no auth state.
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            auth_state: None,
            is_ready: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Something to send through a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Buttons(ButtonMenu),
    Media(MediaAttachment),
}

impl OutboundPayload {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Buttons(_) => "buttons",
            Self::Media(_) => "media",
        }
    }
}

/// A quick-reply button menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMenu {
    pub body: String,
    pub buttons: Vec<String>,
    pub title: Option<String>,
    pub footer: Option<String>,
}

impl ButtonMenu {
    /// The fixed three-option menu sent by `/send-message-button`.
    pub fn standard() -> Self {
        Self {
            body: "Button body".to_string(),
            buttons: vec!["bt1".to_string(), "bt2".to_string(), "bt3".to_string()],
            title: Some("title".to_string()),
            footer: Some("footer".to_string()),
        }
    }
}

/// Media bytes already read by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub caption: String,
}

/// Acknowledgment returned by the underlying send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

/// A message received by one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    pub session_id: String,
    /// Address to reply to (the conversation the message arrived in).
    pub chat: String,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_group: bool,
}
