use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use tracing::debug;

use super::EmbeddingBackend;
use crate::config::ProviderConfig;
use crate::error::PipelineError;

/// Embedding client for any OpenAI-compatible endpoint.
pub struct OpenAiEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbeddings {
    pub fn new(provider: &ProviderConfig) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(provider.api_key.clone())
            .with_api_base(provider.base_url.clone());

        Self {
            client: Client::with_config(config),
            model: provider.embedding_model.clone(),
            timeout: provider.timeout,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| PipelineError::Provider(format!("failed to build embedding request: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| PipelineError::Provider("embedding request timed out".to_string()))?
            .map_err(|e| PipelineError::Provider(format!("failed to create embeddings: {}", e)))?;

        // The provider tags each vector with its input index; reorder rather
        // than trust response order.
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|item| item.embedding).collect();

        if embeddings.len() != texts.len() {
            return Err(PipelineError::Provider(format!(
                "embedding count mismatch: sent {} inputs, got {} vectors",
                texts.len(),
                embeddings.len()
            )));
        }

        debug!(model = %self.model, count = embeddings.len(), "embedded batch");
        Ok(embeddings)
    }
}
