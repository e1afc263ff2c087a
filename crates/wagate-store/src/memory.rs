//! In-process session store. Nothing survives a restart.

use crate::sessions::{delete_key_material, unavailable};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::info;
use wagate_core::{error::GatewayError, message::SessionRecord, traits::SessionStore};

/// Session store kept in a map, for `store.backend = "memory"` and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<BTreeMap<String, SessionRecord>>,
    /// Database holding the `wa_*` key tables, purged on delete.
    key_pool: Option<SqlitePool>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forget a session's key material in `pool` when it is deleted.
    pub fn with_key_pool(mut self, pool: SqlitePool) -> Self {
        self.key_pool = Some(pool);
        self
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        Ok(self.records.lock().await.get(session_id).cloned())
    }

    async fn create(&self, session_id: &str) -> Result<(), GatewayError> {
        self.records
            .lock()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id));
        Ok(())
    }

    async fn upsert_auth_state(&self, session_id: &str, blob: &[u8]) -> Result<(), GatewayError> {
        let mut records = self.records.lock().await;
        let record = records
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id));
        record.auth_state = Some(blob.to_vec());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), GatewayError> {
        if let Some(record) = self.records.lock().await.get_mut(session_id) {
            record.is_ready = ready;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), GatewayError> {
        self.records.lock().await.remove(session_id);

        if let Some(pool) = &self.key_pool {
            let mut tx = pool.begin().await.map_err(unavailable)?;
            delete_key_material(&mut *tx, session_id).await?;
            tx.commit().await.map_err(unavailable)?;
            info!("deleted session {session_id} and its key material");
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, GatewayError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
