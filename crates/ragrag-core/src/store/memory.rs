//! In-memory [`ChunkStore`] for tests and embedding in other tools.
//!
//! Chunks live in a `HashMap` keyed by chunk id, next to a map of source id
//! to content hash, both behind one `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::ChunkRecord;

use super::{ChunkStore, MetadataFilter};

#[derive(Default)]
struct State {
    chunks: HashMap<String, ChunkRecord>,
    sources: HashMap<String, String>,
}

impl State {
    fn insert(&mut self, chunk: &ChunkRecord) {
        self.sources.insert(
            chunk.metadata.source.clone(),
            chunk.metadata.content_hash.clone(),
        );
        self.chunks.insert(chunk.id.clone(), chunk.clone());
    }

    fn remove_source(&mut self, source_id: &str) -> usize {
        self.sources.remove(source_id);
        let before = self.chunks.len();
        self.chunks.retain(|_, c| c.metadata.source != source_id);
        before - self.chunks.len()
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|s| s.chunks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let mut state = self.write()?;
        for c in chunks {
            state.insert(c);
        }
        Ok(())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        Ok(self.write()?.remove_source(source_id))
    }

    async fn query_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<ChunkRecord>> {
        let state = self.read()?;
        let mut out: Vec<ChunkRecord> = state
            .chunks
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.metadata
                .source
                .cmp(&b.metadata.source)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        Ok(out)
    }

    async fn exists(&self, source_id: &str, content_hash: &str) -> Result<bool> {
        let state = self.read()?;
        Ok(state.sources.get(source_id).map(String::as_str) == Some(content_hash))
    }

    async fn replace_source(
        &self,
        source_id: &str,
        content_hash: &str,
        chunks: &[ChunkRecord],
    ) -> Result<()> {
        let mut state = self.write()?;
        state.remove_source(source_id);
        for c in chunks {
            state.insert(c);
        }
        state
            .sources
            .insert(source_id.to_string(), content_hash.to_string());
        Ok(())
    }
}
