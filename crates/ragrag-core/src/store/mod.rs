//! Chunk storage abstraction.
//!
//! The [`ChunkStore`] trait is the only way the pipeline touches the vector
//! store. Implementations must be `Send + Sync` and give read-your-writes
//! consistency within one process.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocKind};

/// Equality filter over chunk metadata. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub source_id: Option<String>,
    pub doc_type: Option<DocKind>,
    pub external_id: Option<String>,
    pub has_full_pdf: Option<bool>,
}

impl MetadataFilter {
    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Default::default()
        }
    }

    pub fn external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        let m = &record.metadata;
        if let Some(source) = &self.source_id {
            if &m.source != source {
                return false;
            }
        }
        if let Some(kind) = self.doc_type {
            if m.doc_type != kind {
                return false;
            }
        }
        if let Some(external_id) = &self.external_id {
            if m.external_id.as_ref() != Some(external_id) {
                return false;
            }
        }
        if let Some(full) = self.has_full_pdf {
            if m.has_full_pdf != Some(full) {
                return false;
            }
        }
        true
    }
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](ChunkStore::upsert) | Insert or overwrite chunks by id |
/// | [`delete_by_source`](ChunkStore::delete_by_source) | Drop every chunk of a source |
/// | [`query_by_metadata`](ChunkStore::query_by_metadata) | List chunks matching a filter |
/// | [`exists`](ChunkStore::exists) | Was `source_id` last written from `hash`? |
/// | [`replace_source`](ChunkStore::replace_source) | Delete-then-insert for one source |
///
/// Stores track the content hash of each source separately from its chunks,
/// so a source that produced no chunks still reports as stored.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()>;

    /// Returns the number of chunks removed. Also forgets the source's hash.
    async fn delete_by_source(&self, source_id: &str) -> Result<usize>;

    /// Matching chunks ordered by `(source, chunk_index)`.
    async fn query_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<ChunkRecord>>;

    async fn exists(&self, source_id: &str, content_hash: &str) -> Result<bool>;

    /// Replace the whole chunk set of `source_id` with `chunks` and record
    /// `content_hash` as its current version. `chunks` may be empty.
    async fn replace_source(
        &self,
        source_id: &str,
        content_hash: &str,
        chunks: &[ChunkRecord],
    ) -> Result<()>;
}
