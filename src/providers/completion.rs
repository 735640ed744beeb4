use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{CompletionBackend, DeltaStream, PromptMessage, Role};
use crate::config::ProviderConfig;
use crate::error::PipelineError;

/// Chat-completion client for any OpenAI-compatible endpoint.
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiCompletion {
    pub fn new(provider: &ProviderConfig) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(provider.api_key.clone())
            .with_api_base(provider.base_url.clone());

        Self {
            client: Client::with_config(config),
            model: provider.completion_model.clone(),
            timeout: provider.timeout,
        }
    }
}

fn build_messages(
    messages: &[PromptMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, PipelineError> {
    let mut built = Vec::with_capacity(messages.len());
    for message in messages {
        let converted: ChatCompletionRequestMessage = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| PipelineError::Provider(format!("failed to build system message: {}", e)))?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| PipelineError::Provider(format!("failed to build user message: {}", e)))?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| {
                    PipelineError::Provider(format!("failed to build assistant message: {}", e))
                })?
                .into(),
        };
        built.push(converted);
    }
    Ok(built)
}

#[async_trait]
impl CompletionBackend for OpenAiCompletion {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PipelineError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(build_messages(messages)?)
            .build()
            .map_err(|e| PipelineError::Provider(format!("failed to build chat request: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| PipelineError::Provider("completion request timed out".to_string()))?
            .map_err(|e| PipelineError::Provider(format!("completion request failed: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(PipelineError::Provider(
                "provider returned an empty completion".to_string(),
            ));
        }

        debug!(model = %self.model, len = content.len(), "completion received");
        Ok(content)
    }

    async fn stream(&self, messages: &[PromptMessage]) -> Result<DeltaStream, PipelineError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(build_messages(messages)?)
            .stream(true)
            .build()
            .map_err(|e| PipelineError::Provider(format!("failed to build chat request: {}", e)))?;

        let stream = tokio::time::timeout(self.timeout, self.client.chat().create_stream(request))
            .await
            .map_err(|_| PipelineError::Provider("completion request timed out".to_string()))?
            .map_err(|e| PipelineError::Provider(format!("failed to open completion stream: {}", e)))?;

        let deltas = stream
            .map(|item| match item {
                Ok(response) => Ok(response
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .collect::<String>()),
                Err(e) => Err(PipelineError::Provider(format!("completion stream failed: {}", e))),
            })
            .filter(|item| {
                // Role-only frames carry no content; skip them.
                let keep = !matches!(item, Ok(text) if text.is_empty());
                futures::future::ready(keep)
            })
            .boxed();

        Ok(deltas)
    }
}
