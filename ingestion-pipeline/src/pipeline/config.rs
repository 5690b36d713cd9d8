use std::str::FromStr;

use common::error::AppError;

/// One orchestrator, three behaviors. `Full` runs every stage, `MetadataOnly`
/// stops after the metadata gate, `IndexOnly` is the reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    MetadataOnly,
    IndexOnly,
}

impl RunMode {
    pub fn metadata_only(self) -> bool {
        matches!(self, Self::MetadataOnly)
    }
}

impl FromStr for RunMode {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "metadata_only" | "metadata-only" => Ok(Self::MetadataOnly),
            "index_only" | "index-only" => Ok(Self::IndexOnly),
            other => Err(AppError::Validation(format!(
                "unknown run mode '{other}'; expected full, metadata_only or index_only"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub run_mode: RunMode,
    pub shard_count: usize,
    pub shard_index: usize,
    pub tuning: PipelineTuning,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Full,
            shard_count: 1,
            shard_index: 0,
            tuning: PipelineTuning::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.shard_count == 0 {
            return Err(AppError::Validation("shard_count must be at least 1".into()));
        }
        if self.shard_index >= self.shard_count {
            return Err(AppError::Validation(format!(
                "shard_index {} out of range for {} shards",
                self.shard_index, self.shard_count
            )));
        }
        self.tuning.validate()
    }
}

/// Knobs the orchestrator consumes but never sources itself; plain values
/// handed in at construction.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub min_text_length: usize,
    pub min_confidence: f32,
    pub min_chunk_length: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub fetch_concurrency: usize,
    pub extract_concurrency: usize,
    pub inference_concurrency: usize,
    pub embedding_concurrency: usize,
    pub document_concurrency: usize,
    pub embedding_batch_size: usize,
    pub upload_batch_size: usize,
    pub upload_concurrency: usize,
    pub work_batch_size: usize,
    pub scan_page_size: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            min_text_length: 1000,
            min_confidence: 0.4,
            min_chunk_length: 150,
            chunk_size: 800,
            chunk_overlap: 80,
            max_retries: 5,
            retry_base_delay_ms: 2000,
            fetch_concurrency: 8,
            extract_concurrency: 8,
            // Inference is rate-limited far harder than fetch.
            inference_concurrency: 2,
            embedding_concurrency: 4,
            document_concurrency: 8,
            embedding_batch_size: 10,
            upload_batch_size: 50,
            upload_concurrency: 8,
            work_batch_size: 100,
            scan_page_size: 500,
        }
    }
}

impl PipelineTuning {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Validation(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.min_chunk_length > self.chunk_size {
            return Err(AppError::Validation(
                "min_chunk_length cannot exceed chunk_size".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(AppError::Validation(
                "min_confidence must lie in [0.0, 1.0]".into(),
            ));
        }

        let pools = [
            ("fetch_concurrency", self.fetch_concurrency),
            ("extract_concurrency", self.extract_concurrency),
            ("inference_concurrency", self.inference_concurrency),
            ("embedding_concurrency", self.embedding_concurrency),
            ("document_concurrency", self.document_concurrency),
            ("embedding_batch_size", self.embedding_batch_size),
            ("upload_batch_size", self.upload_batch_size),
            ("upload_concurrency", self.upload_concurrency),
            ("work_batch_size", self.work_batch_size),
            ("scan_page_size", self.scan_page_size),
        ];
        for (name, value) in pools {
            if value == 0 {
                return Err(AppError::Validation(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}
