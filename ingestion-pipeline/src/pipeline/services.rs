use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::error::AppError;
use common::storage::types::metadata::JudgmentMetadata;
use common::utils::config::AppConfig;

use super::config::PipelineTuning;
use crate::clients::{EmbeddingClient, MetadataInferenceClient, RetryPolicy};
use crate::error::ServiceError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Every external collaborator the orchestrator talks to, behind one seam so
/// tests can substitute deterministic fakes.
#[async_trait]
pub trait DocumentServices: Send + Sync {
    /// Resolves a locator to raw bytes. No side effects on failure.
    async fn fetch(&self, locator: &str) -> Result<Bytes, ServiceError>;

    /// Raw bytes to plain text plus a 0.0-1.0 extraction confidence signal.
    async fn extract(&self, bytes: Bytes) -> Result<(String, f32), ServiceError>;

    async fn infer_metadata(&self, text: &str) -> Result<JudgmentMetadata, ServiceError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

pub struct DefaultDocumentServices {
    http: reqwest::Client,
    fetch_retry: RetryPolicy,
    inference: MetadataInferenceClient,
    embeddings: EmbeddingClient,
}

impl DefaultDocumentServices {
    pub fn new(config: &AppConfig, tuning: &PipelineTuning) -> Result<Self, AppError> {
        let openai_config = async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url);
        let openai_client = Arc::new(async_openai::Client::with_config(openai_config));

        let retry = RetryPolicy::new(tuning.max_retries, tuning.retry_base_delay_ms);
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            http,
            fetch_retry: retry,
            inference: MetadataInferenceClient::new(
                Arc::clone(&openai_client),
                &config.openai_chat_model,
                retry,
            ),
            embeddings: EmbeddingClient::new(
                openai_client,
                &config.openai_embedding_model,
                config.openai_embedding_dimensions,
                retry,
            ),
        })
    }

    async fn fetch_once(&self, locator: &str) -> Result<Bytes, ServiceError> {
        let response = self
            .http
            .get(locator)
            .send()
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .bytes()
                .await
                .map_err(|e| ServiceError::Transient(e.to_string()))
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(ServiceError::Transient(format!(
                "fetch of {locator} returned {status}"
            )))
        } else {
            Err(ServiceError::Permanent(format!(
                "fetch of {locator} returned {status}"
            )))
        }
    }
}

#[async_trait]
impl DocumentServices for DefaultDocumentServices {
    async fn fetch(&self, locator: &str) -> Result<Bytes, ServiceError> {
        self.fetch_retry
            .run(|| async { self.fetch_once(locator).await })
            .await
    }

    async fn extract(&self, bytes: Bytes) -> Result<(String, f32), ServiceError> {
        extract_text(bytes).await
    }

    async fn infer_metadata(&self, text: &str) -> Result<JudgmentMetadata, ServiceError> {
        self.inference.infer(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.embeddings.embed(texts).await
    }
}

/// PDF bytes go through the PDF text extractor on a blocking thread; anything
/// else is treated as text. Failures here are permanent: the same bytes will
/// fail the same way tomorrow.
pub(crate) async fn extract_text(bytes: Bytes) -> Result<(String, f32), ServiceError> {
    let text = if bytes.starts_with(b"%PDF") {
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ServiceError::Permanent(format!("extraction task failed: {e}")))?
            .map_err(|e| ServiceError::Permanent(format!("pdf extraction failed: {e}")))?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let confidence = extraction_confidence(&text);
    Ok((text, confidence))
}

/// Page-level plausibility heuristic for extracted text. Scores are coarse
/// buckets, not probabilities; the quality gate only compares them against a
/// threshold.
pub fn extraction_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let word_count = words.len();
    if word_count == 0 {
        return 0.0;
    }
    let avg_word_len = words
        .iter()
        .map(|word| word.chars().count())
        .sum::<usize>() as f32
        / word_count as f32;
    if !(2.0..=20.0).contains(&avg_word_len) {
        return 0.3;
    }

    let total_chars = trimmed.chars().count() as f32;
    let special_chars = trimmed
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count() as f32;
    if special_chars / total_chars > 0.3 {
        return 0.4;
    }

    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.3;
    }
    let upper_ratio =
        letters.iter().filter(|c| c.is_uppercase()).count() as f32 / letters.len() as f32;
    if !(0.01..=0.8).contains(&upper_ratio) {
        return 0.5;
    }

    0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(extraction_confidence(""), 0.0);
        assert_eq!(extraction_confidence("   \n  "), 0.0);
    }

    #[test]
    fn fragmented_words_score_low() {
        let shattered = "a b c d e f g h i j k l";
        assert_eq!(extraction_confidence(shattered), 0.3);
    }

    #[test]
    fn symbol_noise_scores_low() {
        let noisy = "@@## $$%% ^^&& **(( @@## $$%% ^^&& **((";
        assert_eq!(extraction_confidence(noisy), 0.4);
    }

    #[test]
    fn shouting_scores_mid() {
        let caps = "THE APPEAL IS DISMISSED WITH COSTS THROUGHOUT THE PROCEEDINGS";
        assert_eq!(extraction_confidence(caps), 0.5);
    }

    #[test]
    fn ordinary_prose_scores_high() {
        let prose = "The appellant challenged the order of the trial court. \
                     The respondent supported the decree on all grounds raised below.";
        assert_eq!(extraction_confidence(prose), 0.8);
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_read_as_text() {
        let bytes = Bytes::from_static(b"The court held that the petition succeeds.");
        let (text, confidence) = extract_text(bytes).await.expect("extract");
        assert!(text.starts_with("The court held"));
        assert!(confidence > 0.0);
    }
}
