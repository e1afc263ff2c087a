//! Per-session key store for `whatsapp-rust`.
//!
//! Implements the library's storage traits (SignalStore + AppSyncStore +
//! ProtocolStore + DeviceStore) over the gateway's SQLite pool. Every row is
//! keyed by session id, so two sessions sharing one database never see each
//! other's keys. The tables are created by the session store's migrations.

mod app_sync_store;
mod device_store;
mod protocol_store;
mod signal_store;

use sqlx::{Pool, Sqlite};
use wacore::store::error::{db_err, StoreError};
use wacore::store::Device;

/// Key material for one session.
#[derive(Clone)]
pub struct SessionKeyStore {
    pool: Pool<Sqlite>,
    session_id: String,
}

impl SessionKeyStore {
    pub fn new(pool: Pool<Sqlite>, session_id: &str) -> Self {
        Self {
            pool,
            session_id: session_id.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Restore the device identity from a persisted auth blob, unless this
    /// session already has one. Returns whether a device was written.
    pub async fn seed_device(&self, blob: &[u8]) -> wacore::store::error::Result<bool> {
        // Reject blobs that do not decode as a device.
        let _device: Device =
            bincode::deserialize(blob).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO wa_devices (session_id, data) VALUES (?, ?)")
                .bind(&self.session_id)
                .bind(blob)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// The stored device identity as an opaque blob, if paired.
    pub async fn device_blob(&self) -> wacore::store::error::Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT data FROM wa_devices WHERE session_id = ?")
                .bind(&self.session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|(data,)| data))
    }
}
