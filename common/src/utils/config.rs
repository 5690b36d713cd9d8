use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_chat_model")]
    pub openai_chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub openai_embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub openai_embedding_dimensions: u32,
    pub search_endpoint: String,
    pub search_api_key: String,
    pub search_index_name: String,
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    #[serde(default)]
    pub shard_index: usize,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
    #[serde(default)]
    pub work_manifest: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_shard_count() -> usize {
    1
}

fn default_run_mode() -> String {
    "full".to_string()
}

pub fn get_config() -> Result<AppConfig, AppError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

impl AppConfig {
    /// Rejects configurations that cannot possibly produce a working run.
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("surrealdb_address", &self.surrealdb_address),
            ("surrealdb_namespace", &self.surrealdb_namespace),
            ("surrealdb_database", &self.surrealdb_database),
            ("openai_api_key", &self.openai_api_key),
            ("search_endpoint", &self.search_endpoint),
            ("search_api_key", &self.search_api_key),
            ("search_index_name", &self.search_index_name),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.shard_count == 0 {
            return Err(AppError::Validation(
                "shard_count must be at least 1".into(),
            ));
        }

        if self.shard_index >= self.shard_count {
            return Err(AppError::Validation(format!(
                "shard_index {} out of range for shard_count {}",
                self.shard_index, self.shard_count
            )));
        }

        Ok(())
    }
}
