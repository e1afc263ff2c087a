//! # wagate-channels
//!
//! The chat client behind every gateway session: a WhatsApp Web connection
//! built on `whatsapp-rust`, with its key material kept per session in the
//! gateway's SQLite database.

pub mod whatsapp;
pub mod whatsapp_store;

pub use whatsapp::{WhatsAppClient, WhatsAppClientFactory};
pub use whatsapp_store::SessionKeyStore;
