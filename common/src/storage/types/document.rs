use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::JudgmentMetadata;
use super::{surreal_datetime, surreal_id, surreal_option_datetime, StoredObject};

/// Per-document processing state. One `*Failed` status per stage so a later
/// run can tell exactly where to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Fetched,
    FetchFailed,
    Extracted,
    ExtractFailed,
    MetadataOk,
    MetadataFailed,
    Chunked,
    ChunkFailed,
    Embedded,
    EmbedFailed,
    Indexed,
    IndexFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Metadata,
    Chunking,
    Embedding,
    Indexing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageWindow {
    #[serde(with = "surreal_option_datetime", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_option_datetime", default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Start/end times per stage. Diagnostic only; correctness never depends on
/// these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimestamps {
    #[serde(default)]
    pub fetch: StageWindow,
    #[serde(default)]
    pub extract: StageWindow,
    #[serde(default)]
    pub metadata: StageWindow,
    #[serde(default)]
    pub chunking: StageWindow,
    #[serde(default)]
    pub embedding: StageWindow,
    #[serde(default)]
    pub indexing: StageWindow,
}

impl StageTimestamps {
    fn window_mut(&mut self, stage: Stage) -> &mut StageWindow {
        match stage {
            Stage::Fetch => &mut self.fetch,
            Stage::Extract => &mut self.extract,
            Stage::Metadata => &mut self.metadata,
            Stage::Chunking => &mut self.chunking,
            Stage::Embedding => &mut self.embedding,
            Stage::Indexing => &mut self.indexing,
        }
    }

    pub fn start(&mut self, stage: Stage) {
        self.window_mut(stage).started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, stage: Stage) {
        self.window_mut(stage).finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "surreal_id::deserialize")]
    pub id: String,
    pub locator: String,
    pub size_bytes: u64,
    pub text: String,
    pub confidence: f32,
    pub metadata: Option<JudgmentMetadata>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub stage_timestamps: StageTimestamps,
    pub error_message: Option<String>,
    #[serde(with = "surreal_datetime", default)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime", default)]
    pub updated_at: DateTime<Utc>,
}

impl StoredObject for Document {
    fn table_name() -> &'static str {
        "document"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl Document {
    pub fn new(locator: &str) -> Self {
        let now = Utc::now();
        Self {
            id: derive_document_id(locator),
            locator: locator.to_string(),
            size_bytes: 0,
            text: String::new(),
            confidence: 0.0,
            metadata: None,
            status: DocumentStatus::Pending,
            stage_timestamps: StageTimestamps::default(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, status: DocumentStatus) {
        self.status = status;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, status: DocumentStatus, message: impl Into<String>) {
        self.status = status;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Statuses that count as already-done for skip purposes. Failed states
    /// stay eligible so the next run picks them up again.
    pub fn is_complete(&self, metadata_only: bool) -> bool {
        match self.status {
            DocumentStatus::Indexed => true,
            DocumentStatus::MetadataOk => metadata_only,
            _ => false,
        }
    }
}

/// Document ids are a reversible URL-safe encoding of the source locator.
/// They are derived once and never regenerated from anything else.
pub fn derive_document_id(locator: &str) -> String {
    URL_SAFE_NO_PAD.encode(locator.as_bytes())
}

pub fn decode_document_id(id: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(id).ok()?;
    String::from_utf8(bytes).ok()
}
