//! ProtocolStore trait implementation for SessionKeyStore.
//!
//! SKDM recipients, LID/PN mappings, base keys, device lists, and
//! forget-sender-key marks.

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::{DeviceListRecord, LidPnMappingEntry, ProtocolStore};

use super::SessionKeyStore;

type Result<T> = wacore::store::error::Result<T>;

type LidRow = (String, String, i64, i64, String);

fn lid_entry(row: LidRow) -> LidPnMappingEntry {
    let (lid, phone_number, created_at, updated_at, learning_source) = row;
    LidPnMappingEntry {
        lid,
        phone_number,
        created_at,
        updated_at,
        learning_source,
    }
}

#[async_trait]
impl ProtocolStore for SessionKeyStore {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT device_jid FROM wa_skdm_recipients WHERE session_id = ? AND group_jid = ?",
        )
        .bind(&self.session_id)
        .bind(group_jid)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for device in device_jids {
            sqlx::query(
                "INSERT OR IGNORE INTO wa_skdm_recipients (session_id, group_jid, device_jid) VALUES (?, ?, ?)",
            )
            .bind(&self.session_id)
            .bind(group_jid)
            .bind(device)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        sqlx::query("DELETE FROM wa_skdm_recipients WHERE session_id = ? AND group_jid = ?")
            .bind(&self.session_id)
            .bind(group_jid)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        let row: Option<LidRow> = sqlx::query_as(
            "SELECT lid, phone_number, created_at, updated_at, learning_source FROM wa_lid_mappings WHERE session_id = ? AND lid = ?",
        )
        .bind(&self.session_id)
        .bind(lid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(lid_entry))
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        let row: Option<LidRow> = sqlx::query_as(
            "SELECT lid, phone_number, created_at, updated_at, learning_source FROM wa_lid_mappings WHERE session_id = ? AND phone_number = ? ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(&self.session_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(lid_entry))
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_lid_mappings (session_id, lid, phone_number, created_at, updated_at, learning_source) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(&entry.lid)
        .bind(&entry.phone_number)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(&entry.learning_source)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        let rows: Vec<LidRow> = sqlx::query_as(
            "SELECT lid, phone_number, created_at, updated_at, learning_source FROM wa_lid_mappings WHERE session_id = ?",
        )
        .bind(&self.session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(lid_entry).collect())
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO wa_base_keys (session_id, address, message_id, base_key) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(message_id)
        .bind(base_key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT base_key FROM wa_base_keys WHERE session_id = ? AND address = ? AND message_id = ?",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.is_some_and(|(k,)| k == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM wa_base_keys WHERE session_id = ? AND address = ? AND message_id = ?",
        )
        .bind(&self.session_id)
        .bind(address)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        let data =
            serde_json::to_string(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO wa_device_lists (session_id, user, data) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(&record.user)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM wa_device_lists WHERE session_id = ? AND user = ?")
                .bind(&self.session_id)
                .bind(user)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(|(data,)| {
            serde_json::from_str(&data).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO wa_forget_sender_keys (session_id, group_jid, participant) VALUES (?, ?, ?)",
        )
        .bind(&self.session_id)
        .bind(group_jid)
        .bind(participant)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT participant FROM wa_forget_sender_keys WHERE session_id = ? AND group_jid = ?",
        )
        .bind(&self.session_id)
        .bind(group_jid)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM wa_forget_sender_keys WHERE session_id = ? AND group_jid = ?")
            .bind(&self.session_id)
            .bind(group_jid)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}
