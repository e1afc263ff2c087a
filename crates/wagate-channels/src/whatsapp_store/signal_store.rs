//! SignalStore trait implementation for SessionKeyStore.
//!
//! Identities, signal sessions, prekeys, signed prekeys, and sender keys.

use async_trait::async_trait;
use wacore::store::error::db_err;
use wacore::store::traits::SignalStore;

use super::SessionKeyStore;

type Result<T> = wacore::store::error::Result<T>;

impl SessionKeyStore {
    /// Fetch one blob column from a `(session_id, address)` keyed table.
    async fn blob_by_address(&self, sql: &str, address: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(&self.session_id)
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|(d,)| d))
    }

    async fn delete_by_address(&self, sql: &str, address: &str) -> Result<()> {
        sqlx::query(sql)
            .bind(&self.session_id)
            .bind(address)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl SignalStore for SessionKeyStore {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_identities (session_id, address, key_data) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(key.as_slice())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_identity(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.blob_by_address(
            "SELECT key_data FROM wa_identities WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }

    async fn delete_identity(&self, address: &str) -> Result<()> {
        self.delete_by_address(
            "DELETE FROM wa_identities WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }

    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.blob_by_address(
            "SELECT session_data FROM wa_signal_sessions WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }

    async fn put_session(&self, address: &str, session: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_signal_sessions (session_id, address, session_data) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(session)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_session(&self, address: &str) -> Result<()> {
        self.delete_by_address(
            "DELETE FROM wa_signal_sessions WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }

    async fn store_prekey(&self, id: u32, record: &[u8], uploaded: bool) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_prekeys (session_id, id, record, uploaded) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(id as i64)
        .bind(record)
        .bind(uploaded as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT record FROM wa_prekeys WHERE session_id = ? AND id = ?")
                .bind(&self.session_id)
                .bind(id as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|(d,)| d))
    }

    async fn remove_prekey(&self, id: u32) -> Result<()> {
        sqlx::query("DELETE FROM wa_prekeys WHERE session_id = ? AND id = ?")
            .bind(&self.session_id)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn store_signed_prekey(&self, id: u32, record: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_signed_prekeys (session_id, id, record) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(id as i64)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_signed_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT record FROM wa_signed_prekeys WHERE session_id = ? AND id = ?")
                .bind(&self.session_id)
                .bind(id as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|(d,)| d))
    }

    async fn load_all_signed_prekeys(&self) -> Result<Vec<(u32, Vec<u8>)>> {
        let rows: Vec<(i64, Vec<u8>)> =
            sqlx::query_as("SELECT id, record FROM wa_signed_prekeys WHERE session_id = ?")
                .bind(&self.session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(|(id, r)| (id as u32, r)).collect())
    }

    async fn remove_signed_prekey(&self, id: u32) -> Result<()> {
        sqlx::query("DELETE FROM wa_signed_prekeys WHERE session_id = ? AND id = ?")
            .bind(&self.session_id)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn put_sender_key(&self, address: &str, record: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_sender_keys (session_id, address, record) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_sender_key(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.blob_by_address(
            "SELECT record FROM wa_sender_keys WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }

    async fn delete_sender_key(&self, address: &str) -> Result<()> {
        self.delete_by_address(
            "DELETE FROM wa_sender_keys WHERE session_id = ? AND address = ?",
            address,
        )
        .await
    }
}
