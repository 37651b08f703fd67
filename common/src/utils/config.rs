use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    #[serde(default = "default_workspace_slug")]
    pub default_workspace_slug: String,
    /// Settings key holding the upstream bearer token.
    #[serde(default = "default_credential_key")]
    pub credential_key: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f32,
    #[serde(default = "default_generation_base_timeout_secs")]
    pub generation_base_timeout_secs: u64,
    #[serde(default = "default_generation_per_item_timeout_secs")]
    pub generation_per_item_timeout_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_upload_max_body_bytes")]
    pub upload_max_body_bytes: usize,
    /// Where settings, including the upstream API key, are kept. The `mem://`
    /// default forgets them on restart; deployments must point this at a
    /// persistent SurrealDB server (`ws://host:8000`).
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,
}

fn default_http_port() -> u16 {
    3002
}

fn default_upstream_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_workspace_slug() -> String {
    "default".to_string()
}

fn default_credential_key() -> String {
    "anythingllm_api_key".to_string()
}

fn default_model() -> String {
    "llama2".to_string()
}

fn default_generation_temperature() -> f32 {
    0.7
}

fn default_generation_base_timeout_secs() -> u64 {
    10 * 60
}

fn default_generation_per_item_timeout_secs() -> u64 {
    2 * 60
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_upload_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_surrealdb_address() -> String {
    "mem://".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_namespace() -> String {
    "workspace_proxy".to_string()
}

fn default_surrealdb_database() -> String {
    "settings".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            upstream_base_url: default_upstream_base_url(),
            default_workspace_slug: default_workspace_slug(),
            credential_key: default_credential_key(),
            default_model: default_model(),
            generation_temperature: default_generation_temperature(),
            generation_base_timeout_secs: default_generation_base_timeout_secs(),
            generation_per_item_timeout_secs: default_generation_per_item_timeout_secs(),
            data_dir: default_data_dir(),
            upload_max_body_bytes: default_upload_max_body_bytes(),
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_credential(),
            surrealdb_password: default_surrealdb_credential(),
            surrealdb_namespace: default_surrealdb_namespace(),
            surrealdb_database: default_surrealdb_database(),
        }
    }
}

impl AppConfig {
    /// Private working directory for request-scoped upload files.
    pub fn upload_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("uploads")
    }

    /// False when settings live only in process memory.
    pub fn settings_persist(&self) -> bool {
        !self.surrealdb_address.starts_with("mem://")
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
