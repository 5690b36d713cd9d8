pub mod chunker;
pub mod clients;
pub mod error;
pub mod gates;
pub mod pipeline;

pub use error::{ServiceError, StageError};
pub use pipeline::{
    DefaultDocumentServices, DocumentServices, Pipeline, PipelineConfig, PipelineTuning, RunMode,
    RunSummary,
};
