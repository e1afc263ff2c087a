//! WhatsApp client: pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web. One client per
//! session; each keeps its keys under its own session id.

mod bot;
mod events;
mod qr;
mod send;


pub use qr::{generate_qr_image, generate_qr_terminal};
pub use send::to_jid;

use crate::whatsapp_store::SessionKeyStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wagate_core::{
    error::GatewayError,
    message::{OutboundPayload, SendReceipt},
    traits::{ChatClient, ClientFactory, EventSender},
};
use whatsapp_rust::client::Client;

/// Builds [`WhatsAppClient`]s that share one key database.
pub struct WhatsAppClientFactory {
    pool: SqlitePool,
    device_name: String,
    print_qr: bool,
}

impl WhatsAppClientFactory {
    /// `pool` must already carry the `wa_*` tables.
    pub fn new(pool: SqlitePool, device_name: &str) -> Self {
        Self {
            pool,
            device_name: device_name.to_string(),
            print_qr: true,
        }
    }

    /// Whether pairing codes are drawn on the terminal.
    pub fn with_terminal_qr(mut self, enabled: bool) -> Self {
        self.print_qr = enabled;
        self
    }
}

#[async_trait]
impl ClientFactory for WhatsAppClientFactory {
    async fn create(
        &self,
        session_id: &str,
        auth_state: Option<Vec<u8>>,
        events: EventSender,
    ) -> Result<Arc<dyn ChatClient>, GatewayError> {
        let store = SessionKeyStore::new(self.pool.clone(), session_id);

        if let Some(blob) = auth_state {
            match store.seed_device(&blob).await {
                Ok(true) => info!(session_id, "device restored from saved auth state"),
                Ok(false) => {}
                Err(e) => warn!(session_id, "ignoring unreadable auth state: {e}"),
            }
        }

        Ok(Arc::new(WhatsAppClient {
            session_id: session_id.to_string(),
            store: Arc::new(store),
            device_name: self.device_name.clone(),
            print_qr: self.print_qr,
            events,
            client: Arc::new(Mutex::new(None)),
            runner: Mutex::new(None),
        }))
    }
}

/// One WhatsApp Web connection bound to one session.
pub struct WhatsAppClient {
    pub(super) session_id: String,
    pub(super) store: Arc<SessionKeyStore>,
    pub(super) device_name: String,
    pub(super) print_qr: bool,
    /// Lifecycle and inbound events go here, in emission order.
    pub(super) events: EventSender,
    /// Protocol client for sending, set once the bot is built.
    pub(super) client: Arc<Mutex<Option<Arc<Client>>>>,
    /// Background task running the bot.
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppClient {
    async fn connected_client(&self) -> Result<Arc<Client>, GatewayError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| GatewayError::SendFailed("whatsapp client not connected".into()))
    }
}

#[async_trait]
impl ChatClient for WhatsAppClient {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn initialize(&self) -> Result<(), GatewayError> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            return Ok(());
        }
        *runner = Some(self.build_and_run_bot().await?);
        info!(session_id = %self.session_id, "WhatsApp bot started");
        Ok(())
    }

    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<SendReceipt, GatewayError> {
        let client = self.connected_client().await?;
        let jid = to_jid(to)?;

        let message = match payload {
            OutboundPayload::Text(text) => send::text_message(text),
            OutboundPayload::Buttons(menu) => send::buttons_message(menu),
            OutboundPayload::Media(media) => send::upload_image(&client, media).await?,
        };

        let message_id = client
            .send_message(jid.clone(), message)
            .await
            .map_err(|e| GatewayError::SendFailed(format!("whatsapp send failed: {e}")))?;

        Ok(SendReceipt {
            message_id,
            to: jid.to_string(),
            timestamp: Utc::now(),
        })
    }

    async fn shutdown(&self) -> Result<(), GatewayError> {
        if let Some(runner) = self.runner.lock().await.take() {
            runner.abort();
            info!(session_id = %self.session_id, "WhatsApp bot stopped");
        }
        *self.client.lock().await = None;
        Ok(())
    }
}
