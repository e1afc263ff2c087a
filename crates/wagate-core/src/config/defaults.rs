//! Default value functions used by serde for config deserialization.

pub fn default_data_dir() -> String {
    "~/.wagate".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_api_port() -> u16 {
    3000
}

pub fn default_upload_dir() -> String {
    "~/.wagate/uploads".to_string()
}

pub fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

pub fn default_db_path() -> String {
    "~/.wagate/data/sessions.db".to_string()
}

pub fn default_ready_timeout_secs() -> u64 {
    10
}

pub fn default_device_name() -> String {
    "wagate".to_string()
}

pub fn default_country_code() -> String {
    "62".to_string()
}

pub fn default_domain() -> String {
    "@c.us".to_string()
}

pub fn default_triggers() -> Vec<String> {
    vec!["uks list".to_string(), "data uks".to_string()]
}

pub fn default_group_label() -> String {
    "Asrama".to_string()
}

pub fn default_no_class_label() -> String {
    "Tidak Sekolah".to_string()
}
