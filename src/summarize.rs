use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ChunkingConfig;
use crate::error::PipelineError;
use crate::prompts;
use crate::providers::CompletionBackend;
use crate::text::pack_chunks;

const MAX_TLDR_ENTRIES: usize = 5;
const MIN_TLDR_ENTRIES: usize = 3;

/// Structured summary returned by the non-streaming endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryResult {
    pub url: String,
    pub title: String,
    pub tldr: Vec<String>,
    pub summary: String,
    #[serde(rename = "usedSources")]
    pub used_sources: Vec<String>,
}

/// Pulls the JSON object out of a model reply.
///
/// Grammar: strip code-fence markers, slice from the first `{` to the last
/// `}`, parse. Each failure mode is its own error message so misbehaving
/// models can be diagnosed from logs alone.
pub fn extract_json_object(raw: &str) -> Result<Value, PipelineError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let start = cleaned
        .find('{')
        .ok_or_else(|| PipelineError::MalformedModelOutput("no JSON object found".to_string()))?;
    let end = cleaned
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| PipelineError::MalformedModelOutput("unterminated JSON object".to_string()))?;

    serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| PipelineError::MalformedModelOutput(format!("invalid JSON: {}", e)))
}

/// Validates the `{tldr, summary}` payload and normalizes its fields.
pub fn parse_summary_payload(raw: &str) -> Result<(Vec<String>, String), PipelineError> {
    let value = extract_json_object(raw)?;

    let entries = value
        .get("tldr")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::MalformedModelOutput("tldr is missing or not an array".to_string()))?;
    let tldr: Vec<String> = entries
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .take(MAX_TLDR_ENTRIES)
        .collect();
    if tldr.len() < MIN_TLDR_ENTRIES {
        return Err(PipelineError::MalformedModelOutput(format!(
            "tldr has {} usable entries, need at least {}",
            tldr.len(),
            MIN_TLDR_ENTRIES
        )));
    }

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if summary.is_empty() {
        return Err(PipelineError::MalformedModelOutput("summary is empty".to_string()));
    }

    Ok((tldr, summary))
}

/// Strict-mode summarizer: one pass for small or pre-narrowed input,
/// map-reduce for everything else.
pub struct Summarizer {
    completion: Arc<dyn CompletionBackend>,
    chunking: ChunkingConfig,
}

impl Summarizer {
    pub fn new(completion: Arc<dyn CompletionBackend>, chunking: ChunkingConfig) -> Self {
        Self {
            completion,
            chunking,
        }
    }

    /// Produces a validated `SummaryResult`.
    ///
    /// When retrieval already narrowed the content, `selected` carries the
    /// top chunks and a single synthesis pass runs over them. Without a
    /// selection, oversized content goes through per-chunk mini-summaries
    /// first.
    pub async fn generate(
        &self,
        paragraphs: &[String],
        selected: Option<&[String]>,
        language: &str,
        url: &str,
        title: &str,
    ) -> Result<SummaryResult, PipelineError> {
        let synthesis_source = match selected {
            Some(chunks) if !chunks.is_empty() => chunks.join("\n\n"),
            _ => {
                let combined = paragraphs.join("\n\n");
                if combined.len() > self.chunking.direct_input_ceiling {
                    self.map_reduce(paragraphs, language).await?
                } else {
                    combined
                }
            }
        };

        debug!(source_len = synthesis_source.len(), "requesting final summary");
        let raw = self
            .completion
            .complete(&prompts::final_summary_json(&synthesis_source, language, url))
            .await?;
        let (tldr, summary) = parse_summary_payload(&raw)?;

        Ok(SummaryResult {
            url: url.to_string(),
            title: title.to_string(),
            tldr,
            summary,
            used_sources: vec![url.to_string()],
        })
    }

    async fn map_reduce(
        &self,
        paragraphs: &[String],
        language: &str,
    ) -> Result<String, PipelineError> {
        let chunks = pack_chunks(paragraphs, self.chunking.map_target);
        info!(chunks = chunks.len(), "content too large, running map-reduce");

        let mut mini_summaries = Vec::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            debug!(
                chunk = position + 1,
                total = chunks.len(),
                len = chunk.len(),
                "summarizing chunk"
            );
            let mini = self
                .completion
                .complete(&prompts::chunk_summary(chunk, language))
                .await?;
            mini_summaries.push(mini);
        }

        Ok(mini_summaries.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::providers::{DeltaStream, PromptMessage};

    #[test]
    fn extractor_strips_fences() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(raw).unwrap()["a"], 1);
    }

    #[test]
    fn extractor_slices_surrounding_prose() {
        let raw = "Sure, here you go: {\"a\": [1, 2]} Hope that helps!";
        assert_eq!(extract_json_object(raw).unwrap()["a"][1], 2);
    }

    #[test]
    fn extractor_reports_missing_object() {
        let err = extract_json_object("no braces here").unwrap_err();
        assert_eq!(err.kind(), "malformed_model_output");
    }

    #[test]
    fn extractor_reports_unterminated_object() {
        let err = extract_json_object("{\"a\": 1").unwrap_err();
        assert_eq!(err.kind(), "malformed_model_output");
    }

    #[test]
    fn payload_needs_three_usable_bullets() {
        let raw = r#"{"tldr": ["one", "  ", ""], "summary": "text"}"#;
        let err = parse_summary_payload(raw).unwrap_err();
        assert_eq!(err.kind(), "malformed_model_output");

        let raw = r#"{"tldr": ["one", "two", "three"], "summary": "text"}"#;
        let (tldr, summary) = parse_summary_payload(raw).unwrap();
        assert_eq!(tldr.len(), 3);
        assert_eq!(summary, "text");
    }

    #[test]
    fn payload_caps_bullets_at_five() {
        let raw = r#"{"tldr": ["1", "2", "3", "4", "5", "6", "7"], "summary": "s"}"#;
        let (tldr, _) = parse_summary_payload(raw).unwrap();
        assert_eq!(tldr.len(), 5);
    }

    #[test]
    fn payload_rejects_empty_summary() {
        let raw = r#"{"tldr": ["a", "b", "c"], "summary": "   "}"#;
        assert!(parse_summary_payload(raw).is_err());
    }

    #[test]
    fn payload_rejects_non_string_summary() {
        let raw = r#"{"tldr": ["a", "b", "c"], "summary": 42}"#;
        assert!(parse_summary_payload(raw).is_err());
    }

    /// Completion stub that answers every call with a fixed valid payload
    /// and counts the calls.
    struct CannedCompletion {
        calls: AtomicUsize,
    }

    impl CannedCompletion {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for CannedCompletion {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"tldr": ["one", "two", "three"], "summary": "A compact overview."}"#.to_string())
        }

        async fn stream(&self, _messages: &[PromptMessage]) -> Result<DeltaStream, PipelineError> {
            Ok(futures::stream::iter(vec![Ok("unused".to_string())]).boxed())
        }
    }

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            retrieval_target: 1200,
            map_target: 50,
            direct_input_ceiling: 100,
        }
    }

    #[tokio::test]
    async fn small_input_runs_a_single_pass() {
        let backend = Arc::new(CannedCompletion::new());
        let summarizer = Summarizer::new(backend.clone(), chunking());
        let paragraphs = vec!["short".to_string()];

        let result = summarizer
            .generate(&paragraphs, None, "en", "https://example.com", "Title")
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.used_sources, vec!["https://example.com"]);
        assert_eq!(result.tldr.len(), 3);
        assert!(!result.summary.is_empty());
    }

    #[tokio::test]
    async fn oversized_input_goes_through_map_reduce() {
        let backend = Arc::new(CannedCompletion::new());
        let summarizer = Summarizer::new(backend.clone(), chunking());
        // Four paragraphs of 60 chars against a 100-char ceiling and a
        // 50-char map target: one mini-summary per paragraph plus synthesis.
        let paragraphs: Vec<String> = (0..4).map(|i| format!("{:0>60}", i)).collect();

        summarizer
            .generate(&paragraphs, None, "en", "https://example.com", "Title")
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn preselected_chunks_skip_map_reduce() {
        let backend = Arc::new(CannedCompletion::new());
        let summarizer = Summarizer::new(backend.clone(), chunking());
        let paragraphs: Vec<String> = (0..4).map(|i| format!("{:0>60}", i)).collect();
        let selected: Vec<String> = paragraphs[..2].to_vec();

        summarizer
            .generate(
                &paragraphs,
                Some(&selected),
                "en",
                "https://example.com",
                "Title",
            )
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_payload_surfaces_as_error() {
        struct BrokenCompletion;

        #[async_trait]
        impl CompletionBackend for BrokenCompletion {
            async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, PipelineError> {
                Ok("definitely not json".to_string())
            }

            async fn stream(
                &self,
                _messages: &[PromptMessage],
            ) -> Result<DeltaStream, PipelineError> {
                Ok(futures::stream::iter(Vec::new()).boxed())
            }
        }

        let summarizer = Summarizer::new(Arc::new(BrokenCompletion), chunking());
        let err = summarizer
            .generate(
                &["text".to_string()],
                None,
                "en",
                "https://example.com",
                "Title",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_model_output");
    }
}
