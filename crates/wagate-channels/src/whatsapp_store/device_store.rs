//! DeviceStore trait implementation for SessionKeyStore.

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::DeviceStore;
use wacore::store::Device;

use super::SessionKeyStore;

type Result<T> = wacore::store::error::Result<T>;

#[async_trait]
impl DeviceStore for SessionKeyStore {
    async fn save(&self, device: &Device) -> Result<()> {
        // Device carries fixed-size arrays that need a binary format.
        let data =
            bincode::serialize(device).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("INSERT OR REPLACE INTO wa_devices (session_id, data) VALUES (?, ?)")
            .bind(&self.session_id)
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Device>> {
        match self.device_blob().await? {
            Some(data) => {
                let device = bincode::deserialize(&data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(device))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM wa_devices WHERE session_id = ?")
            .bind(&self.session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn create(&self) -> Result<i32> {
        // One device per session; its data arrives through save().
        Ok(1)
    }
}
