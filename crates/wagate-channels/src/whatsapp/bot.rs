//! Bot lifecycle: building and running the WhatsApp bot, and translating its
//! events into client events.

use super::events::inbound_message;
use super::qr::generate_qr_terminal;
use super::WhatsAppClient;
use crate::whatsapp_store::SessionKeyStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use wagate_core::{
    error::GatewayError,
    traits::{ClientEvent, EventSender},
};
use whatsapp_rust::bot::Bot;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

impl WhatsAppClient {
    /// Build a WhatsApp bot over this session's key store and run it in the
    /// background. Returns the task running it.
    pub(super) async fn build_and_run_bot(&self) -> Result<JoinHandle<()>, GatewayError> {
        let session_id = self.session_id.clone();
        info!(session_id = %session_id, "WhatsApp bot building...");

        let backend: Arc<SessionKeyStore> = Arc::clone(&self.store);
        let store_for_event = Arc::clone(&self.store);
        let events_for_event = self.events.clone();
        let client_for_event = self.client.clone();
        let print_qr = self.print_qr;

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let session_id = session_id.clone();
                let events = events_for_event.clone();
                let store = store_for_event.clone();
                let client_store = client_for_event.clone();
                async move {
                    match event {
                        Event::PairingQrCode { code, .. } => {
                            info!(session_id = %session_id, "WhatsApp QR code generated");
                            if print_qr {
                                match generate_qr_terminal(&code) {
                                    Ok(qr) => println!("\nsession {session_id}:\n{qr}"),
                                    Err(e) => warn!("QR render failed: {e}"),
                                }
                            }
                            forward(&events, ClientEvent::Qr(code)).await;
                        }
                        Event::PairSuccess(_) => {
                            info!(session_id = %session_id, "WhatsApp pairing successful");
                            if let Some(blob) = auth_snapshot(&store).await {
                                forward(&events, ClientEvent::Authenticated(blob)).await;
                            }
                        }
                        Event::Connected(_) => {
                            info!(session_id = %session_id, "WhatsApp connected");
                            *client_store.lock().await = Some(client);
                            // Connected also follows a restored login, so the
                            // snapshot is taken here too.
                            if let Some(blob) = auth_snapshot(&store).await {
                                forward(&events, ClientEvent::Authenticated(blob)).await;
                            }
                            forward(&events, ClientEvent::Ready).await;
                        }
                        Event::Disconnected(_) => {
                            warn!(session_id = %session_id, "WhatsApp disconnected");
                            *client_store.lock().await = None;
                            let reason = "connection closed".to_string();
                            forward(&events, ClientEvent::Disconnected(reason)).await;
                        }
                        Event::LoggedOut(_) => {
                            warn!(session_id = %session_id, "WhatsApp logged out");
                            *client_store.lock().await = None;
                            let reason = "logged out from phone".to_string();
                            forward(&events, ClientEvent::AuthFailure(reason)).await;
                        }
                        Event::Message(msg, info) => {
                            if let Some(message) = inbound_message(&session_id, *msg, info) {
                                forward(&events, ClientEvent::Message(message)).await;
                            }
                        }
                        _ => {}
                    }
                }
            })
            .build()
            .await
            .map_err(|e| {
                GatewayError::InitializationFailed(format!("whatsapp bot build failed: {e}"))
            })?;

        *self.client.lock().await = Some(bot.client());

        bot.run().await.map_err(|e| {
            GatewayError::InitializationFailed(format!("whatsapp bot run failed: {e}"))
        })
    }
}

/// The stored device identity, serialized, to persist as the session's auth
/// state.
async fn auth_snapshot(store: &SessionKeyStore) -> Option<Vec<u8>> {
    match store.device_blob().await {
        Ok(blob) => blob,
        Err(e) => {
            warn!(session_id = store.session_id(), "failed to read device: {e}");
            None
        }
    }
}

async fn forward(events: &EventSender, event: ClientEvent) {
    if events.send(event).await.is_err() {
        debug!("client event receiver dropped");
    }
}
