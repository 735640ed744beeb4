use tracing::{debug, info};

use super::{chunk_hash, content_hash, vector_to_bytes, ChunkRecord, EmbeddingStore};
use crate::error::PipelineError;
use crate::providers::EmbeddingBackend;

/// What an index pass actually did; mostly useful for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// The document hash and model matched; nothing was touched.
    pub cache_hit: bool,
    /// Chunks sent to the embedding provider.
    pub embedded: usize,
    /// Chunks whose stored rows were kept as-is.
    pub reused: usize,
    /// Trailing rows removed because the document shrank.
    pub deleted: usize,
}

/// Brings the stored rows for `url` in line with `chunks`, embedding only
/// what changed.
///
/// A chunk is re-embedded when its hash differs from the stored row, when it
/// has no stored row, or when the embedding model changed since the last pass
/// (which re-embeds everything). Trailing rows beyond the new chunk count are
/// deleted. Document metadata is rewritten last so a crash mid-pass re-runs
/// the diff instead of trusting a stale hash.
pub async fn index_document(
    store: &EmbeddingStore,
    embedder: &dyn EmbeddingBackend,
    batch_size: usize,
    url: &str,
    title: &str,
    chunks: &[String],
) -> Result<IndexOutcome, PipelineError> {
    let document_hash = content_hash(chunks);
    let model = embedder.model_id();

    if let Some(existing) = store.get_document(url)? {
        if existing.content_hash == document_hash
            && existing.embedding_model == model
            && existing.chunk_count as usize == chunks.len()
        {
            debug!(url, "index cache hit, skipping embedding");
            return Ok(IndexOutcome {
                cache_hit: true,
                reused: chunks.len(),
                ..IndexOutcome::default()
            });
        }
    }

    let document = store.upsert_document(url, title)?;
    let prior_model = document.embedding_model.clone();
    let model_changed = prior_model != model;
    let prior: Vec<u64> = store
        .get_chunks(document.id)?
        .iter()
        .map(|record| record.chunk_hash)
        .collect();

    let mut changed: Vec<(usize, u64)> = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let hash = chunk_hash(chunk);
        let unchanged = !model_changed && prior.get(index).is_some_and(|stored| *stored == hash);
        if !unchanged {
            changed.push((index, hash));
        }
    }

    let deleted = if chunks.len() < prior.len() {
        store.delete_chunks_from(document.id, chunks.len() as u32)?
    } else {
        0
    };

    let batch_size = batch_size.max(1);
    for batch in changed.chunks(batch_size) {
        let texts: Vec<String> = batch
            .iter()
            .map(|(index, _)| chunks[*index].clone())
            .collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(PipelineError::Provider(format!(
                "embedding batch mismatch: sent {}, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        for ((index, hash), vector) in batch.iter().zip(vectors) {
            let record = ChunkRecord {
                index: *index as u32,
                content: chunks[*index].clone(),
                dim: vector.len() as u32,
                embedding: vector_to_bytes(&vector),
                chunk_hash: *hash,
            };
            store.put_chunk(document.id, &record)?;
        }
    }

    store.update_document_meta(&document, document_hash, model, chunks.len() as u32)?;

    let outcome = IndexOutcome {
        cache_hit: false,
        embedded: changed.len(),
        reused: chunks.len() - changed.len(),
        deleted,
    };
    info!(
        url,
        embedded = outcome.embedded,
        reused = outcome.reused,
        deleted = outcome.deleted,
        model_changed,
        "indexed document"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Deterministic embedder that records every batch it receives.
    struct CountingEmbedder {
        model: String,
        calls: AtomicUsize,
        embedded_texts: Mutex<Vec<String>>,
    }

    impl CountingEmbedder {
        fn new(model: &str) -> Self {
            Self {
                model: model.to_string(),
                calls: AtomicUsize::new(0),
                embedded_texts: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn texts(&self) -> Vec<String> {
            self.embedded_texts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CountingEmbedder {
        fn model_id(&self) -> &str {
            &self.model
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.embedded_texts
                .lock()
                .unwrap()
                .extend(texts.iter().cloned());
            Ok(texts
                .iter()
                .map(|text| vec![text.len() as f32, 1.0, 0.0])
                .collect())
        }
    }

    fn chunks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn first_index_embeds_everything() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let embedder = CountingEmbedder::new("model-a");
        let input = chunks(&["alpha", "beta", "gamma"]);

        let outcome = index_document(&store, &embedder, 64, "https://example.com", "T", &input)
            .await
            .unwrap();
        assert_eq!(outcome.embedded, 3);
        assert_eq!(outcome.reused, 0);
        assert!(!outcome.cache_hit);

        let doc = store.get_document("https://example.com").unwrap().unwrap();
        assert_eq!(doc.chunk_count, 3);
        assert_eq!(doc.embedding_model, "model-a");
        assert_eq!(store.get_chunks(doc.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unchanged_reindex_makes_zero_embedding_calls() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let embedder = CountingEmbedder::new("model-a");
        let input = chunks(&["alpha", "beta"]);

        index_document(&store, &embedder, 64, "https://example.com", "T", &input)
            .await
            .unwrap();
        let calls_after_first = embedder.call_count();

        let outcome = index_document(&store, &embedder, 64, "https://example.com", "T", &input)
            .await
            .unwrap();
        assert!(outcome.cache_hit);
        assert_eq!(outcome.embedded, 0);
        assert_eq!(embedder.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn editing_one_chunk_reembeds_exactly_that_chunk() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let embedder = CountingEmbedder::new("model-a");
        let original = chunks(&["alpha", "beta", "gamma"]);
        index_document(&store, &embedder, 64, "https://example.com", "T", &original)
            .await
            .unwrap();

        let doc = store.get_document("https://example.com").unwrap().unwrap();
        let hashes_before: Vec<u64> = store
            .get_chunks(doc.id)
            .unwrap()
            .iter()
            .map(|c| c.chunk_hash)
            .collect();

        let edited = chunks(&["alpha", "beta edited", "gamma"]);
        let outcome = index_document(&store, &embedder, 64, "https://example.com", "T", &edited)
            .await
            .unwrap();
        assert_eq!(outcome.embedded, 1);
        assert_eq!(outcome.reused, 2);
        assert_eq!(embedder.texts().last().unwrap(), "beta edited");

        let hashes_after: Vec<u64> = store
            .get_chunks(doc.id)
            .unwrap()
            .iter()
            .map(|c| c.chunk_hash)
            .collect();
        assert_eq!(hashes_before[0], hashes_after[0]);
        assert_ne!(hashes_before[1], hashes_after[1]);
        assert_eq!(hashes_before[2], hashes_after[2]);
    }

    #[tokio::test]
    async fn model_change_forces_full_reembed() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let input = chunks(&["alpha", "beta"]);

        let first = CountingEmbedder::new("model-a");
        index_document(&store, &first, 64, "https://example.com", "T", &input)
            .await
            .unwrap();

        let second = CountingEmbedder::new("model-b");
        let outcome = index_document(&store, &second, 64, "https://example.com", "T", &input)
            .await
            .unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(outcome.embedded, 2);

        let doc = store.get_document("https://example.com").unwrap().unwrap();
        assert_eq!(doc.embedding_model, "model-b");
    }

    #[tokio::test]
    async fn shrinking_deletes_trailing_chunks() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let embedder = CountingEmbedder::new("model-a");
        index_document(
            &store,
            &embedder,
            64,
            "https://example.com",
            "T",
            &chunks(&["a", "b", "c", "d"]),
        )
        .await
        .unwrap();

        let outcome = index_document(
            &store,
            &embedder,
            64,
            "https://example.com",
            "T",
            &chunks(&["a", "b"]),
        )
        .await
        .unwrap();
        assert_eq!(outcome.deleted, 2);

        let doc = store.get_document("https://example.com").unwrap().unwrap();
        assert_eq!(doc.chunk_count, 2);
        assert_eq!(store.get_chunks(doc.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batches_respect_the_configured_size() {
        let store = EmbeddingStore::open_temporary().unwrap();
        let embedder = CountingEmbedder::new("model-a");
        let input: Vec<String> = (0..5).map(|i| format!("chunk {}", i)).collect();

        index_document(&store, &embedder, 2, "https://example.com", "T", &input)
            .await
            .unwrap();
        // 5 chunks in batches of 2 means 3 provider calls.
        assert_eq!(embedder.call_count(), 3);
    }
}
