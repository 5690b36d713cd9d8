use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use common::storage::types::metadata::JudgmentMetadata;

use super::{classify_openai_error, RetryPolicy};
use crate::error::ServiceError;

/// Only the head of the judgment is sent for inference; the operative
/// metadata (parties, court, date) appears there.
const METADATA_PREVIEW_CHARS: usize = 15_000;

const SYSTEM_MESSAGE: &str = "You are a legal document analyzer specialized in \
Indian High Court judgments. Extract metadata from legal documents and return \
ONLY a valid JSON object with the specified fields. If you cannot find a \
particular field, use null or an empty string.";

pub struct MetadataInferenceClient {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
    retry: RetryPolicy,
}

impl MetadataInferenceClient {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    pub async fn infer(&self, text: &str) -> Result<JudgmentMetadata, ServiceError> {
        let preview = truncate_on_char_boundary(text, METADATA_PREVIEW_CHARS);
        self.retry
            .run(|| async { self.request_metadata(preview).await })
            .await
    }

    async fn request_metadata(&self, preview: &str) -> Result<JudgmentMetadata, ServiceError> {
        let user_message = format!(
            "Extract the following metadata from this legal document:\n\n\
             1. Case Name: the full case name with all parties\n\
             2. Citation: the formal citation if available\n\
             3. Case Number: the case or petition number\n\
             4. Date of Judgment: the judgment date (format: YYYY-MM-DD)\n\
             5. Bench: the judge(s) who delivered the judgment\n\
             6. Subject Matter: the primary legal subject\n\
             7. Keywords: 5-10 key legal terms or concepts\n\
             8. Summary: a brief (3-5 sentences) summary of the case\n\
             9. Petitioner Advocates: advocates representing the petitioner\n\
             10. Respondent Advocates: advocates representing the respondent\n\
             11. Court: the name of the court\n\n\
             Document text:\n{preview}"
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .response_format(ResponseFormat::JsonObject)
            .temperature(0.1)
            .build()
            .map_err(|e| ServiceError::Permanent(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| ServiceError::Permanent("empty inference response".into()))?;

        parse_metadata_json(content).ok_or_else(|| {
            ServiceError::Permanent(format!(
                "inference response was not valid metadata JSON: {}",
                truncate_on_char_boundary(content, 120)
            ))
        })
    }
}

/// The model is asked for bare JSON but occasionally wraps it in prose or a
/// code fence; salvage the outermost object before giving up.
pub fn parse_metadata_json(raw: &str) -> Option<JudgmentMetadata> {
    if let Ok(metadata) = serde_json::from_str(raw.trim()) {
        return Some(metadata);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn truncate_on_char_boundary(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
