use std::sync::Arc;

use async_openai::types::CreateEmbeddingRequestArgs;

use super::{classify_openai_error, RetryPolicy};
use crate::error::ServiceError;

/// One batched call to the vectorization service. Batch composition and the
/// per-item fallback on batch failure are the orchestrator's concern; this
/// client owns the wire call and its retry policy.
pub struct EmbeddingClient {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
    dimensions: u32,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: impl Into<String>,
        dimensions: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
            retry,
        }
    }

    /// Returns one vector per input, in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.retry
            .run(|| async { self.request_embeddings(texts).await })
            .await
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .dimensions(self.dimensions)
            .build()
            .map_err(|e| ServiceError::Permanent(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        if response.data.len() != texts.len() {
            return Err(ServiceError::Permanent(format!(
                "embedding service returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}
