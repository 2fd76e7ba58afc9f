//! Attach provenance to chunks.
//!
//! [`MetadataBuilder`] is a pure transform from `(chunk text, document
//! context)` to a [`ChunkRecord`]. Paper-derived chunks additionally carry
//! a [`PaperTag`] with the lifecycle flag and external identifier.

use crate::hash::chunk_id;
use crate::models::{ChunkMetadata, ChunkRecord, DocKind, Document, TextChunk};

/// Paper context for chunks that belong to a discovered paper.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaperTag {
    pub external_id: String,
    pub has_full_pdf: bool,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub citation_count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    source: String,
    doc_type: DocKind,
    content_hash: String,
    paper: Option<PaperTag>,
}

impl MetadataBuilder {
    pub fn new(source: impl Into<String>, doc_type: DocKind, content_hash: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            doc_type,
            content_hash: content_hash.into(),
            paper: None,
        }
    }

    pub fn for_document(doc: &Document) -> Self {
        Self::new(doc.source_id.clone(), doc.kind, doc.content_hash.clone())
    }

    pub fn with_paper(mut self, tag: PaperTag) -> Self {
        self.paper = Some(tag);
        self
    }

    pub fn build(&self, chunk: TextChunk) -> ChunkRecord {
        let paper = self.paper.as_ref();
        ChunkRecord {
            id: chunk_id(&self.source, chunk.index, &self.content_hash),
            metadata: ChunkMetadata {
                source: self.source.clone(),
                doc_type: self.doc_type,
                section: chunk.section,
                chunk_index: chunk.index,
                content_hash: self.content_hash.clone(),
                token_count: chunk.token_count,
                external_id: paper.map(|p| p.external_id.clone()),
                has_full_pdf: paper.map(|p| p.has_full_pdf),
                title: paper.and_then(|p| p.title.clone()),
                year: paper.and_then(|p| p.year),
                citation_count: paper.and_then(|p| p.citation_count),
            },
            text: chunk.text,
        }
    }

    pub fn build_all(&self, chunks: Vec<TextChunk>) -> Vec<ChunkRecord> {
        chunks.into_iter().map(|c| self.build(c)).collect()
    }
}
