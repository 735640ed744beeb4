pub mod completion;
pub mod embeddings;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub use completion::OpenAiCompletion;
pub use embeddings::OpenAiEmbeddings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Incremental completion fragments, already unwrapped from the provider's
/// framing.
pub type DeltaStream = BoxStream<'static, Result<String, PipelineError>>;

/// Embedding provider seam. Input order is preserved in the output.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier of the embedding model; recorded per document so a model
    /// swap forces re-embedding.
    fn model_id(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Completion provider seam.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// One-shot completion, full text back.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PipelineError>;

    /// Streamed completion; fragments arrive in provider order.
    async fn stream(&self, messages: &[PromptMessage]) -> Result<DeltaStream, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let message = PromptMessage::system("hello");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hello"}"#);

        let parsed: PromptMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let parsed = serde_json::from_str::<PromptMessage>(r#"{"role":"tool","content":"x"}"#);
        assert!(parsed.is_err());
    }
}
