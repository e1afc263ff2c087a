//! Report rows read from a SQLite database with a configured query.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;
use wagate_core::{
    config::ReportConfig, error::GatewayError, report::ReportEntry, shellexpand,
    traits::ReportSource,
};

/// Runs `report.query` and maps each row to a [`ReportEntry`].
///
/// The query must yield four TEXT columns: group, name, comma-separated
/// complaints (nullable) and class (nullable).
pub struct SqlReportSource {
    pool: SqlitePool,
    query: String,
}

impl SqlReportSource {
    /// Open the report database read-only.
    pub async fn open(config: &ReportConfig) -> Result<Self, GatewayError> {
        let db_path = shellexpand(&config.db_path);
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| GatewayError::Config(format!("invalid report db path: {e}")))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await
            .map_err(|e| GatewayError::DataStoreUnavailable(e.to_string()))?;
        info!("Report source opened at {db_path}");
        Ok(Self::with_pool(pool, &config.query))
    }

    /// Use an existing pool.
    pub fn with_pool(pool: SqlitePool, query: &str) -> Self {
        Self {
            pool,
            query: query.to_string(),
        }
    }
}

fn split_complaints(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl ReportSource for SqlReportSource {
    async fn fetch(&self) -> Result<Vec<ReportEntry>, GatewayError> {
        let rows: Vec<(String, String, Option<String>, Option<String>)> =
            sqlx::query_as(&self.query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| GatewayError::DataStoreUnavailable(format!("report query: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(group, name, complaints, class)| ReportEntry {
                group,
                name,
                complaints: split_complaints(complaints),
                class,
            })
            .collect())
    }
}
