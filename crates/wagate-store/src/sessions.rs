//! SQLite-backed session records.
//!
//! The same database holds the per-session WhatsApp key material (`wa_*`
//! tables), so deleting a session here also forgets its pairing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use wagate_core::{
    config::StoreConfig, error::GatewayError, message::SessionRecord, shellexpand,
    traits::SessionStore,
};

/// Tables holding protocol key material, all keyed by `session_id`.
pub const KEY_TABLES: &[&str] = &[
    "wa_devices",
    "wa_identities",
    "wa_signal_sessions",
    "wa_prekeys",
    "wa_signed_prekeys",
    "wa_sender_keys",
    "wa_app_sync_keys",
    "wa_app_versions",
    "wa_mutation_macs",
    "wa_skdm_recipients",
    "wa_lid_mappings",
    "wa_base_keys",
    "wa_device_lists",
    "wa_forget_sender_keys",
];

type RecordRow = (String, Option<Vec<u8>>, i64, String, String);

/// Durable session store backed by SQLite.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) the database, running migrations on first use.
    pub async fn open(config: &StoreConfig) -> Result<Self, GatewayError> {
        let db_path = shellexpand(&config.db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::DataStoreUnavailable(format!("failed to create data dir: {e}"))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| GatewayError::Config(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(unavailable)?;

        Self::run_migrations(&pool).await?;

        info!("Session store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// A private in-memory database. Single connection so every query sees
    /// the same data.
    pub async fn in_memory() -> Result<Self, GatewayError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| GatewayError::Config(format!("invalid db path: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(unavailable)?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run SQL migrations, tracking which have already been applied.
    pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), GatewayError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| {
            GatewayError::DataStoreUnavailable(format!("failed to create migrations table: {e}"))
        })?;

        let migrations: &[(&str, &str)] = &[
            (
                "001_sessions",
                include_str!("../migrations/001_sessions.sql"),
            ),
            (
                "002_whatsapp_keys",
                include_str!("../migrations/002_whatsapp_keys.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(unavailable)?;
            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
                GatewayError::DataStoreUnavailable(format!("migration {name} failed: {e}"))
            })?;
            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(unavailable)?;
            debug!("applied migration {name}");
        }

        Ok(())
    }
}

/// Remove every key-material row for `session_id`.
pub(crate) async fn delete_key_material(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> Result<(), GatewayError> {
    for table in KEY_TABLES {
        sqlx::query(&format!("DELETE FROM {table} WHERE session_id = ?"))
            .bind(session_id)
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;
    }
    Ok(())
}

pub(crate) fn unavailable(e: sqlx::Error) -> GatewayError {
    GatewayError::DataStoreUnavailable(e.to_string())
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn into_record(row: RecordRow) -> SessionRecord {
    let (session_id, auth_state, is_ready, created_at, updated_at) = row;
    SessionRecord {
        session_id,
        auth_state,
        is_ready: is_ready != 0,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT session_id, auth_state, is_ready, created_at, updated_at \
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(row.map(into_record))
    }

    async fn create(&self, session_id: &str) -> Result<(), GatewayError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO sessions (session_id, is_ready, created_at, updated_at) \
             VALUES (?, 0, ?, ?)",
        )
        .bind(session_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn upsert_auth_state(&self, session_id: &str, blob: &[u8]) -> Result<(), GatewayError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sessions (session_id, auth_state, is_ready, created_at, updated_at) \
             VALUES (?, ?, 0, ?, ?) \
             ON CONFLICT(session_id) DO UPDATE SET \
             auth_state = excluded.auth_state, updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(blob)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), GatewayError> {
        sqlx::query("UPDATE sessions SET is_ready = ?, updated_at = ? WHERE session_id = ?")
            .bind(ready as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        delete_key_material(&mut *tx, session_id).await?;
        tx.commit().await.map_err(unavailable)?;
        info!("deleted session {session_id} and its key material");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, GatewayError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT session_id, auth_state, is_ready, created_at, updated_at \
             FROM sessions ORDER BY session_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(rows.into_iter().map(into_record).collect())
    }
}
