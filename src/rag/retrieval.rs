use std::sync::Arc;

use nalgebra::DVector;
use tracing::debug;

use super::{index_document, EmbeddingStore, ScoredChunk};
use crate::config::RetrievalConfig;
use crate::error::PipelineError;
use crate::providers::EmbeddingBackend;
use crate::text::pack_chunks;

/// Cosine similarity of two vectors.
///
/// Zero when either vector has no magnitude. Mismatched dimensions cannot
/// happen for vectors produced by one model, so they score as the worst
/// possible match instead of panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::NEG_INFINITY;
    }

    let vec_a = DVector::from_vec(a.to_vec());
    let vec_b = DVector::from_vec(b.to_vec());

    let dot_product = vec_a.dot(&vec_b);
    let norm_a = vec_a.norm();
    let norm_b = vec_b.norm();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Indexes a document's chunks and serves the top-K most relevant ones.
pub struct Retriever {
    store: EmbeddingStore,
    embedder: Arc<dyn EmbeddingBackend>,
    config: RetrievalConfig,
    chunk_target: usize,
}

impl Retriever {
    pub fn new(
        store: EmbeddingStore,
        embedder: Arc<dyn EmbeddingBackend>,
        config: RetrievalConfig,
        chunk_target: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            chunk_target,
        }
    }

    /// Chunks the paragraphs, reconciles the stored rows, then returns the
    /// top-K chunks for `query` in original document order. Ranking decides
    /// which chunks matter; reading order stays the document's own.
    pub async fn index_and_select(
        &self,
        url: &str,
        title: &str,
        paragraphs: &[String],
        query: Option<&str>,
    ) -> Result<Vec<String>, PipelineError> {
        let chunks = pack_chunks(paragraphs, self.chunk_target);
        if chunks.is_empty() {
            return Ok(paragraphs.to_vec());
        }

        index_document(
            &self.store,
            self.embedder.as_ref(),
            self.config.embed_batch_size,
            url,
            title,
            &chunks,
        )
        .await?;

        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(&self.config.default_query);
        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PipelineError::Provider("provider returned no embedding for the query".to_string())
            })?;

        let document = self.store.get_document(url)?.ok_or_else(|| {
            PipelineError::Store(format!("document vanished right after indexing: {}", url))
        })?;
        let stored = self.store.get_chunks(document.id)?;
        if stored.is_empty() {
            return Ok(paragraphs.to_vec());
        }

        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .map(|record| ScoredChunk {
                index: record.index,
                content: record.content.clone(),
                score: cosine_similarity(&query_vector, &record.vector()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.top_k);
        scored.sort_by_key(|chunk| chunk.index);

        debug!(url, kept = scored.len(), query, "retrieval selected chunks");
        Ok(scored.into_iter().map(|chunk| chunk.content).collect())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    #[test]
    fn cosine_of_a_vector_with_itself_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 0.001);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let v = vec![0.5, -1.0, 2.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 0.001);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn zero_magnitude_scores_zero() {
        let zero = vec![0.0, 0.0];
        let v = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
    }

    #[test]
    fn dimension_mismatch_scores_worst_not_panics() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), f32::NEG_INFINITY);
    }

    /// Scores any text mentioning "kernel" close to the "kernel" query and
    /// everything else far from it.
    struct TopicEmbedder;

    #[async_trait]
    impl EmbeddingBackend for TopicEmbedder {
        fn model_id(&self) -> &str {
            "topic-test"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(texts
                .iter()
                .map(|text| {
                    if text.to_lowercase().contains("kernel") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn retriever(top_k: usize) -> Retriever {
        let config = RetrievalConfig {
            top_k,
            prompt_chunk_cap: top_k,
            default_query: "summary".to_string(),
            embed_batch_size: 64,
        };
        Retriever::new(
            EmbeddingStore::open_temporary().unwrap(),
            Arc::new(TopicEmbedder),
            config,
            // Small target so each paragraph becomes its own chunk.
            8,
        )
    }

    #[tokio::test]
    async fn selection_keeps_document_order() {
        let paragraphs: Vec<String> = vec![
            "cooking pasta at home".to_string(),
            "the kernel scheduler".to_string(),
            "gardening tips".to_string(),
            "kernel memory management".to_string(),
            "travel notes".to_string(),
        ];

        let selected = retriever(2)
            .index_and_select("https://example.com", "T", &paragraphs, Some("kernel"))
            .await
            .unwrap();

        // Both kernel chunks win on score, and they come back in document
        // order even though ranking found the later one equally relevant.
        assert_eq!(selected.len(), 2);
        assert!(selected[0].contains("scheduler"));
        assert!(selected[1].contains("memory management"));
    }

    #[tokio::test]
    async fn blank_query_falls_back_to_default() {
        let paragraphs: Vec<String> =
            vec!["kernel things".to_string(), "other things".to_string()];
        let selected = retriever(1)
            .index_and_select("https://example.com", "T", &paragraphs, Some("   "))
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[tokio::test]
    async fn empty_paragraphs_pass_through() {
        let selected = retriever(3)
            .index_and_select("https://example.com", "T", &[], None)
            .await
            .unwrap();
        assert!(selected.is_empty());
    }
}
