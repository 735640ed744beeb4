pub mod indexer;
pub mod retrieval;
pub mod store;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

pub use indexer::{index_document, IndexOutcome};
pub use retrieval::{cosine_similarity, Retriever};
pub use store::EmbeddingStore;

/// One indexed page. Keyed by normalized URL in the store; created on first
/// index, updated on every re-index, never deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub url: String,
    pub title: String,
    /// xxh3 over the full joined chunk set; the cache-hit gate.
    pub content_hash: u64,
    /// Model that produced the stored vectors; a change forces re-embedding.
    pub embedding_model: String,
    pub chunk_count: u32,
    pub updated_at: i64,
}

/// One chunk row, keyed by `(document id, index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: u32,
    pub content: String,
    /// Fixed-width little-endian IEEE-754 f32 blob, `dim` entries.
    pub embedding: Vec<u8>,
    pub dim: u32,
    pub chunk_hash: u64,
}

impl ChunkRecord {
    pub fn vector(&self) -> Vec<f32> {
        bytes_to_vector(&self.embedding)
    }
}

/// Ephemeral retrieval scoring row.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub index: u32,
    pub content: String,
    pub score: f32,
}

pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Digest of one chunk's text.
pub fn chunk_hash(content: &str) -> u64 {
    xxh3_64(content.as_bytes())
}

/// Digest of the whole chunk set, used for the document-level cache hit.
pub fn content_hash(chunks: &[String]) -> u64 {
    xxh3_64(chunks.join("\n\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_blob_round_trips() {
        let vector = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        let bytes = vector_to_bytes(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_vector(&bytes), vector);
    }

    #[test]
    fn content_hash_tracks_chunk_boundaries() {
        let a = vec!["ab".to_string(), "c".to_string()];
        let b = vec!["a".to_string(), "bc".to_string()];
        // Same bytes, different chunking: the separator position moves, so
        // the joined form still differs.
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
    }
}
