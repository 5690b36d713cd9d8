use common::error::AppError;
use common::storage::types::document::DocumentStatus;
use thiserror::Error;

/// Failure classification for a single external collaborator call. The retry
/// policy loops only on `Transient`; `Permanent` surfaces immediately.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Where in the stage sequence a document failed this run. Gate rejections
/// are kept distinct from collaborator errors even though both land the
/// document in the same `*Failed` status.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(ServiceError),
    #[error("text extraction failed: {0}")]
    Extract(ServiceError),
    #[error("extracted text rejected: {0}")]
    QualityRejected(String),
    #[error("metadata inference failed: {0}")]
    Infer(ServiceError),
    #[error("inferred metadata rejected: {0}")]
    MetadataRejected(String),
    #[error("chunking produced no acceptable chunks")]
    ChunkingProducedNone,
    #[error("embedding failed for every chunk: {0}")]
    Embed(ServiceError),
    #[error("index accepted none of the document's chunks")]
    IndexRejected,
    #[error(transparent)]
    Store(#[from] AppError),
}

impl StageError {
    /// The status to record on the document. `None` means the failure is not
    /// tied to a stage (a store write failed) and the current status stands.
    pub fn failed_status(&self) -> Option<DocumentStatus> {
        match self {
            Self::Fetch(_) => Some(DocumentStatus::FetchFailed),
            Self::Extract(_) | Self::QualityRejected(_) => Some(DocumentStatus::ExtractFailed),
            Self::Infer(_) | Self::MetadataRejected(_) => Some(DocumentStatus::MetadataFailed),
            Self::ChunkingProducedNone => Some(DocumentStatus::ChunkFailed),
            Self::Embed(_) => Some(DocumentStatus::EmbedFailed),
            Self::IndexRejected => Some(DocumentStatus::IndexFailed),
            Self::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_rejections_share_status_with_collaborator_failures() {
        let rejected = StageError::QualityRejected("too short".into());
        let errored = StageError::Extract(ServiceError::Permanent("bad bytes".into()));
        assert_eq!(rejected.failed_status(), errored.failed_status());
        assert_eq!(rejected.failed_status(), Some(DocumentStatus::ExtractFailed));
    }

    #[test]
    fn store_failures_keep_current_status() {
        let err = StageError::Store(AppError::Internal("connection reset".into()));
        assert!(err.failed_status().is_none());
    }
}
