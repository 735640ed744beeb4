use std::path::Path;

use sled::Db;
use tracing::debug;

use super::{ChunkRecord, DocumentRecord};
use crate::error::PipelineError;

/// Sled-backed persistence for documents and their chunk embeddings.
///
/// Two trees: `documents` keyed by normalized URL, `chunks` keyed by the
/// document id and chunk index, both big-endian so a prefix scan yields
/// chunks in document order. Row writes are individually atomic; concurrent
/// re-indexing of one URL resolves last-writer-wins.
pub struct EmbeddingStore {
    db: Db,
    documents: sled::Tree,
    chunks: sled::Tree,
}

fn chunk_key(document_id: u64, index: u32) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&document_id.to_be_bytes());
    key[8..].copy_from_slice(&index.to_be_bytes());
    key
}

impl EmbeddingStore {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store for tests.
    pub fn open_temporary() -> Result<Self, PipelineError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, PipelineError> {
        let documents = db.open_tree("documents")?;
        let chunks = db.open_tree("chunks")?;
        Ok(Self {
            db,
            documents,
            chunks,
        })
    }

    pub fn get_document(&self, url: &str) -> Result<Option<DocumentRecord>, PipelineError> {
        match self.documents.get(url.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Creates the document row on first sight, otherwise refreshes its
    /// title. Identity (`id`) is stable across re-indexing.
    pub fn upsert_document(&self, url: &str, title: &str) -> Result<DocumentRecord, PipelineError> {
        let record = match self.get_document(url)? {
            Some(mut existing) => {
                existing.title = title.to_string();
                existing
            }
            None => DocumentRecord {
                id: self.db.generate_id()?,
                url: url.to_string(),
                title: title.to_string(),
                content_hash: 0,
                embedding_model: String::new(),
                chunk_count: 0,
                updated_at: chrono::Utc::now().timestamp_millis(),
            },
        };
        self.documents
            .insert(url.as_bytes(), bincode::serialize(&record)?)?;
        Ok(record)
    }

    /// Rewrites the document metadata after an index pass.
    pub fn update_document_meta(
        &self,
        record: &DocumentRecord,
        content_hash: u64,
        embedding_model: &str,
        chunk_count: u32,
    ) -> Result<DocumentRecord, PipelineError> {
        let updated = DocumentRecord {
            content_hash,
            embedding_model: embedding_model.to_string(),
            chunk_count,
            updated_at: chrono::Utc::now().timestamp_millis(),
            ..record.clone()
        };
        self.documents
            .insert(updated.url.as_bytes(), bincode::serialize(&updated)?)?;
        Ok(updated)
    }

    /// All stored chunks of a document, ascending by index.
    pub fn get_chunks(&self, document_id: u64) -> Result<Vec<ChunkRecord>, PipelineError> {
        let mut records = Vec::new();
        for item in self.chunks.scan_prefix(document_id.to_be_bytes()) {
            let (_, value) = item?;
            records.push(bincode::deserialize::<ChunkRecord>(&value)?);
        }
        Ok(records)
    }

    pub fn put_chunk(&self, document_id: u64, record: &ChunkRecord) -> Result<(), PipelineError> {
        self.chunks.insert(
            chunk_key(document_id, record.index),
            bincode::serialize(record)?,
        )?;
        Ok(())
    }

    /// Deletes every chunk at `start_index` or beyond; returns how many rows
    /// went away.
    pub fn delete_chunks_from(
        &self,
        document_id: u64,
        start_index: u32,
    ) -> Result<usize, PipelineError> {
        let mut deleted = 0;
        let keys: Vec<_> = self
            .chunks
            .range(chunk_key(document_id, start_index)..=chunk_key(document_id, u32::MAX))
            .filter_map(|item| item.ok().map(|(key, _)| key))
            .collect();
        for key in keys {
            if self.chunks.remove(key)?.is_some() {
                deleted += 1;
            }
        }
        debug!(document_id, start_index, deleted, "trimmed trailing chunks");
        Ok(deleted)
    }
}
