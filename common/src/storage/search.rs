use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;

/// One indexable chunk, flattened with its metadata snapshot. This is the
/// unit the search index stores; chunk ids are deterministic, so repeated
/// uploads of the same record overwrite instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub content_vector: Vec<f32>,
    pub chunk_index: u32,
    pub chunk_total: u32,
    pub case_name: String,
    pub case_number: String,
    pub citation: String,
    pub court: String,
    pub bench: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub petitioner_advocates: Vec<String>,
    pub respondent_advocates: Vec<String>,
    pub date_of_judgment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-record acknowledgment from a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait SearchPublisher: Send + Sync {
    /// Creates or updates the index. Failure here aborts a run.
    async fn ensure_index(&self) -> Result<(), AppError>;

    /// Uploads a batch and reports success per record; a mixed result is
    /// normal and must not be collapsed into a single error.
    async fn upload_batch(&self, records: Vec<SearchRecord>)
        -> Result<Vec<UploadOutcome>, AppError>;

    async fn is_indexed(&self, document_id: &str) -> Result<bool, AppError>;

    /// Which of the given document ids have at least one indexed chunk.
    /// Must agree with calling `is_indexed` one at a time.
    async fn is_indexed_batch(
        &self,
        document_ids: &[String],
    ) -> Result<HashSet<String>, AppError>;

    /// Every distinct document id present in the index. Paged full scan,
    /// never a fixed-size sample.
    async fn indexed_document_ids(&self, page_size: usize) -> Result<HashSet<String>, AppError>;
}

const API_VERSION: &str = "2023-10-01-Preview";
const FILTER_BATCH: usize = 50;

/// REST adapter for the hosted search service.
pub struct HttpSearchPublisher {
    http: reqwest::Client,
    endpoint: String,
    index_name: String,
    api_key: String,
    vector_dimensions: u32,
}

impl HttpSearchPublisher {
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        api_key: impl Into<String>,
        vector_dimensions: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            index_name: index_name.into(),
            api_key: api_key.into(),
            vector_dimensions,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.index_name,
            suffix,
            API_VERSION
        )
    }

    async fn search_page(
        &self,
        filter: Option<&str>,
        select: &str,
        top: usize,
        skip: usize,
    ) -> Result<Vec<Value>, AppError> {
        let mut body = json!({
            "search": "*",
            "select": select,
            "top": top,
            "skip": skip,
        });
        if let Some(filter) = filter {
            body["filter"] = Value::String(filter.to_string());
        }

        let response = self
            .http
            .post(self.url("/docs/search"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::SearchIndex(format!(
                "search query failed: {status} - {detail}"
            )));
        }

        let page: SearchPage = response.json().await?;
        Ok(page.value)
    }

    async fn filtered_document_ids(
        &self,
        filter: &str,
        page_size: usize,
    ) -> Result<HashSet<String>, AppError> {
        let mut found = HashSet::new();
        let mut skip = 0;
        loop {
            let page = self
                .search_page(Some(filter), "document_id", page_size, skip)
                .await?;
            let fetched = page.len();
            for hit in page {
                if let Some(id) = hit.get("document_id").and_then(Value::as_str) {
                    found.insert(id.to_string());
                }
            }
            if fetched < page_size {
                break;
            }
            skip += fetched;
        }
        Ok(found)
    }

    fn index_schema(&self) -> Value {
        json!({
            "name": self.index_name,
            "fields": [
                {"name": "id", "type": "Edm.String", "key": true, "filterable": true},
                {"name": "document_id", "type": "Edm.String", "filterable": true, "searchable": true},
                {"name": "content", "type": "Edm.String", "searchable": true, "analyzer": "en.microsoft"},
                {"name": "chunk_index", "type": "Edm.Int32", "filterable": true},
                {"name": "chunk_total", "type": "Edm.Int32", "filterable": true},
                {"name": "case_name", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true},
                {"name": "case_number", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true},
                {"name": "citation", "type": "Edm.String", "searchable": true, "filterable": true},
                {"name": "court", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true},
                {"name": "bench", "type": "Edm.String", "searchable": true, "filterable": true},
                {"name": "summary", "type": "Edm.String", "searchable": true},
                {"name": "keywords", "type": "Collection(Edm.String)", "searchable": true, "filterable": true, "facetable": true},
                {"name": "petitioner_advocates", "type": "Collection(Edm.String)", "searchable": true},
                {"name": "respondent_advocates", "type": "Collection(Edm.String)", "searchable": true},
                {"name": "date_of_judgment", "type": "Edm.String", "filterable": true, "sortable": true},
                {"name": "created_at", "type": "Edm.DateTimeOffset", "filterable": true, "sortable": true},
                {
                    "name": "content_vector",
                    "type": "Collection(Edm.Single)",
                    "dimensions": self.vector_dimensions,
                    "vectorSearchProfile": "judgment-profile"
                }
            ],
            "vectorSearch": {
                "algorithms": [
                    {
                        "name": "judgment-hnsw",
                        "kind": "hnsw",
                        "hnswParameters": {"m": 10, "efConstruction": 500, "efSearch": 1000, "metric": "cosine"}
                    }
                ],
                "profiles": [
                    {"name": "judgment-profile", "algorithm": "judgment-hnsw"}
                ]
            }
        })
    }
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    value: Vec<Value>,
}

#[derive(Deserialize)]
struct IndexBatchResponse {
    #[serde(default)]
    value: Vec<IndexItemResult>,
}

#[derive(Deserialize)]
struct IndexItemResult {
    key: String,
    #[serde(default)]
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[async_trait]
impl SearchPublisher for HttpSearchPublisher {
    async fn ensure_index(&self) -> Result<(), AppError> {
        let response = self
            .http
            .put(self.url(""))
            .header("api-key", &self.api_key)
            .json(&self.index_schema())
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!(index = %self.index_name, "search index ensured");
            Ok(())
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            Err(AppError::SearchIndex(format!(
                "failed to create index '{}': {status} - {detail}",
                self.index_name
            )))
        }
    }

    async fn upload_batch(
        &self,
        records: Vec<SearchRecord>,
    ) -> Result<Vec<UploadOutcome>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut actions = Vec::with_capacity(records.len());
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        for record in records {
            let mut value = serde_json::to_value(&record)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("@search.action".into(), Value::String("upload".into()));
            }
            actions.push(value);
        }

        let response = self
            .http
            .post(self.url("/docs/index"))
            .header("api-key", &self.api_key)
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::SearchIndex(format!(
                "batch upload failed: {status} - {detail}"
            )));
        }

        let parsed: IndexBatchResponse = response.json().await?;
        if parsed.value.is_empty() {
            // Some deployments omit per-item results on full success.
            return Ok(ids
                .into_iter()
                .map(|id| UploadOutcome {
                    id,
                    success: true,
                    error: None,
                })
                .collect());
        }

        Ok(parsed
            .value
            .into_iter()
            .map(|item| UploadOutcome {
                success: item.status && item.error_message.is_none(),
                id: item.key,
                error: item.error_message,
            })
            .collect())
    }

    async fn is_indexed(&self, document_id: &str) -> Result<bool, AppError> {
        let hits = self
            .search_page(
                Some(&format!("document_id eq '{document_id}'")),
                "id",
                1,
                0,
            )
            .await?;
        Ok(!hits.is_empty())
    }

    async fn is_indexed_batch(
        &self,
        document_ids: &[String],
    ) -> Result<HashSet<String>, AppError> {
        let mut indexed = HashSet::new();
        for batch in document_ids.chunks(FILTER_BATCH) {
            let filter = format!("search.in(document_id, '{}', ',')", batch.join(","));
            indexed.extend(self.filtered_document_ids(&filter, FILTER_BATCH).await?);
        }
        Ok(indexed)
    }

    async fn indexed_document_ids(&self, page_size: usize) -> Result<HashSet<String>, AppError> {
        let page_size = page_size.max(1);
        let mut found = HashSet::new();
        let mut skip = 0;
        loop {
            let page = self
                .search_page(None, "document_id", page_size, skip)
                .await?;
            let fetched = page.len();
            for hit in page {
                if let Some(id) = hit.get("document_id").and_then(Value::as_str) {
                    found.insert(id.to_string());
                }
            }
            if fetched < page_size {
                break;
            }
            skip += fetched;
        }
        Ok(found)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use in_memory::InMemorySearchPublisher;

#[cfg(any(test, feature = "test-utils"))]
mod in_memory {
    use super::{AppError, HashSet, SearchPublisher, SearchRecord, UploadOutcome};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Search index stand-in for tests: keyed by record id like the real
    /// thing, with injectable per-record failures.
    #[derive(Default)]
    pub struct InMemorySearchPublisher {
        records: Mutex<HashMap<String, SearchRecord>>,
        rejected_ids: Mutex<HashSet<String>>,
    }

    impl InMemorySearchPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Any future upload of these record ids will be reported failed.
        pub async fn reject_ids<I: IntoIterator<Item = String>>(&self, ids: I) {
            self.rejected_ids.lock().await.extend(ids);
        }

        pub async fn record_count(&self) -> usize {
            self.records.lock().await.len()
        }

        pub async fn stored_records(&self) -> Vec<SearchRecord> {
            let mut records: Vec<SearchRecord> =
                self.records.lock().await.values().cloned().collect();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            records
        }

        pub async fn contains_record(&self, id: &str) -> bool {
            self.records.lock().await.contains_key(id)
        }

        pub async fn seed(&self, record: SearchRecord) {
            self.records.lock().await.insert(record.id.clone(), record);
        }
    }

    #[async_trait]
    impl SearchPublisher for InMemorySearchPublisher {
        async fn ensure_index(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn upload_batch(
            &self,
            records: Vec<SearchRecord>,
        ) -> Result<Vec<UploadOutcome>, AppError> {
            let rejected = self.rejected_ids.lock().await.clone();
            let mut stored = self.records.lock().await;
            let mut outcomes = Vec::with_capacity(records.len());
            for record in records {
                if rejected.contains(&record.id) {
                    outcomes.push(UploadOutcome {
                        id: record.id,
                        success: false,
                        error: Some("rejected by test publisher".into()),
                    });
                } else {
                    let id = record.id.clone();
                    stored.insert(id.clone(), record);
                    outcomes.push(UploadOutcome {
                        id,
                        success: true,
                        error: None,
                    });
                }
            }
            Ok(outcomes)
        }

        async fn is_indexed(&self, document_id: &str) -> Result<bool, AppError> {
            Ok(self
                .records
                .lock()
                .await
                .values()
                .any(|record| record.document_id == document_id))
        }

        async fn is_indexed_batch(
            &self,
            document_ids: &[String],
        ) -> Result<HashSet<String>, AppError> {
            let records = self.records.lock().await;
            Ok(document_ids
                .iter()
                .filter(|id| records.values().any(|r| &r.document_id == *id))
                .cloned()
                .collect())
        }

        async fn indexed_document_ids(
            &self,
            _page_size: usize,
        ) -> Result<HashSet<String>, AppError> {
            Ok(self
                .records
                .lock()
                .await
                .values()
                .map(|record| record.document_id.clone())
                .collect())
        }
    }
}
