use std::sync::Arc;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::metadata_store::SurrealMetadataStore;
use common::storage::search::HttpSearchPublisher;
use common::storage::types::work_item::WorkItem;
use common::utils::config::{get_config, AppConfig};
use ingestion_pipeline::{
    DefaultDocumentServices, Pipeline, PipelineConfig, PipelineTuning, RunMode,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let run_mode: RunMode = config.run_mode.parse()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    let store = Arc::new(SurrealMetadataStore::new(db));

    let publisher = Arc::new(HttpSearchPublisher::new(
        &config.search_endpoint,
        &config.search_index_name,
        &config.search_api_key,
        config.openai_embedding_dimensions,
    ));

    let pipeline_config = PipelineConfig {
        run_mode,
        shard_count: config.shard_count,
        shard_index: config.shard_index,
        tuning: PipelineTuning::default(),
    };
    let services = Arc::new(DefaultDocumentServices::new(
        &config,
        &pipeline_config.tuning,
    )?);

    let pipeline = Pipeline::new(store, publisher, services, pipeline_config)?;

    let work = match run_mode {
        // Reconciliation works off the stores, not the manifest.
        RunMode::IndexOnly => Vec::new(),
        RunMode::Full | RunMode::MetadataOnly => load_work_manifest(&config)?,
    };

    let summary = pipeline.run(&work).await?;
    info!(
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped,
        chunks_published = summary.chunks_published,
        chunks_failed = summary.chunks_failed,
        "run complete"
    );

    Ok(())
}

/// The corpus enumerator hands over a JSON manifest of work items; this
/// process only partitions and consumes it.
fn load_work_manifest(config: &AppConfig) -> Result<Vec<WorkItem>, AppError> {
    let path = config.work_manifest.as_deref().ok_or_else(|| {
        AppError::Validation("work_manifest is required for forward runs".into())
    })?;
    let raw = std::fs::read_to_string(path)?;
    let items: Vec<WorkItem> = serde_json::from_str(&raw)?;
    info!(path, items = items.len(), "loaded work manifest");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_work_items() {
        let raw = r#"[
            {"locator": "blob://court/2020/a.pdf", "external_id": "case-1"},
            {"locator": "blob://court/2020/b.pdf", "external_id": "case-2"}
        ]"#;
        let items: Vec<WorkItem> = serde_json::from_str(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].locator, "blob://court/2020/a.pdf");
        assert_eq!(items[1].external_id, "case-2");
    }
}
