pub mod embedding;
pub mod inference;
pub mod retry;

pub use embedding::EmbeddingClient;
pub use inference::MetadataInferenceClient;
pub use retry::RetryPolicy;

use async_openai::error::OpenAIError;

use crate::error::ServiceError;

/// Rate limits and server-side failures are worth retrying; everything else
/// (bad request, auth, unparseable response) is not.
pub(crate) fn classify_openai_error(error: OpenAIError) -> ServiceError {
    match error {
        OpenAIError::Reqwest(inner) => ServiceError::Transient(inner.to_string()),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let message = api.message.clone();
            if kind.contains("rate_limit")
                || kind.contains("server_error")
                || kind.contains("overloaded")
                || message.contains("rate limit")
            {
                ServiceError::Transient(message)
            } else {
                ServiceError::Permanent(message)
            }
        }
        other => ServiceError::Permanent(other.to_string()),
    }
}
