mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::GatewayError;
use crate::phone;
use defaults::*;

/// Top-level wagate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for the rolling log file. Empty = stdout only.
    #[serde(default)]
    pub log_dir: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Where uploaded images are spooled while a send is in flight.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            upload_dir: default_upload_dir(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Which session store implementation to run with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite file (default).
    #[default]
    Sqlite,
    /// Process memory. Sessions are lost on restart.
    Memory,
}

/// Session store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
        }
    }
}

/// What happens to the durable record when a client disconnects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep the auth blob, clear the readiness flag. The next request resumes
    /// without a new QR scan.
    #[default]
    ClearReady,
    /// Delete the record and its key material. The session must be started
    /// and paired again.
    Delete,
}

/// Client lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a request waits for a client to become ready.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,
    /// Device name shown in the phone's linked-devices list.
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl SessionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout_secs(),
            on_disconnect: DisconnectPolicy::default(),
            device_name: default_device_name(),
        }
    }
}

/// Recipient address normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Replaces a leading `0` in local numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_domain")]
    pub domain: String,
}

impl PhoneConfig {
    /// Normalize a raw number into a recipient address.
    pub fn normalize(&self, raw: &str) -> String {
        phone::normalize_recipient(raw, &self.country_code, &self.domain)
    }
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            domain: default_domain(),
        }
    }
}

/// Inbound auto-reply settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lowercase phrases; a message starting with any of them gets a report reply.
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            triggers: default_triggers(),
        }
    }
}

/// Report query used by the auto-reply.
///
/// The query must return `(group, name, complaints, class)` columns, with
/// `complaints` comma-separated and `class` nullable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub db_path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_group_label")]
    pub group_label: String,
    #[serde(default = "default_no_class_label")]
    pub no_class_label: String,
}

impl ReportConfig {
    /// A report source can only be built when both the database and the query are set.
    pub fn is_configured(&self) -> bool {
        !self.db_path.trim().is_empty() && !self.query.trim().is_empty()
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            query: String::new(),
            group_label: default_group_label(),
            no_class_label: default_no_class_label(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, GatewayError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| GatewayError::Config(format!("failed to parse config: {}", e)))?;

    if config.session.ready_timeout_secs == 0 {
        return Err(GatewayError::Config(
            "session.ready_timeout_secs must be greater than zero".into(),
        ));
    }

    Ok(config)
}
