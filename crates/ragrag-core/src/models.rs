//! Core data models shared by the ingestion and paper lifecycle pipelines.
//!
//! These types describe what flows between the stages:
//! raw [`Document`] → [`NormalizedText`] → [`TextChunk`] → [`ChunkRecord`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::hash::content_hash;

/// The closed set of document kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Pdf,
    Markdown,
    Html,
    Text,
    PaperSummary,
}

impl DocKind {
    /// Stable string form, as stored in chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Pdf => "pdf",
            DocKind::Markdown => "markdown",
            DocKind::Html => "html",
            DocKind::Text => "text",
            DocKind::PaperSummary => "paper_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(DocKind::Pdf),
            "markdown" => Some(DocKind::Markdown),
            "html" => Some(DocKind::Html),
            "text" => Some(DocKind::Text),
            "paper_summary" => Some(DocKind::PaperSummary),
            _ => None,
        }
    }

    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocKind::Pdf),
            "md" | "markdown" => Some(DocKind::Markdown),
            "html" | "htm" => Some(DocKind::Html),
            "txt" => Some(DocKind::Text),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Map a MIME type (parameters ignored) to a kind.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocKind::Pdf),
            "text/markdown" | "text/x-markdown" => Some(DocKind::Markdown),
            "text/html" | "application/xhtml+xml" => Some(DocKind::Html),
            "text/plain" => Some(DocKind::Text),
            _ => None,
        }
    }

    /// Preferred file extension when persisting a document of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            DocKind::Pdf => "pdf",
            DocKind::Markdown => "md",
            DocKind::Html => "html",
            DocKind::Text | DocKind::PaperSummary => "txt",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source artifact, immutable once read.
#[derive(Debug, Clone)]
pub struct Document {
    /// Relative corpus path, or `paper:<external_id>` for papers.
    pub source_id: String,
    pub kind: DocKind,
    pub raw: Vec<u8>,
    /// Fingerprint of `raw`.
    pub content_hash: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, kind: DocKind, raw: Vec<u8>) -> Self {
        let content_hash = content_hash(&raw);
        Self {
            source_id: source_id.into(),
            kind,
            raw,
            content_hash,
        }
    }
}

/// Structural role of a span inside [`NormalizedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Paragraph,
    Heading { level: u8 },
    /// Never split (fenced code, `<pre>`).
    Atomic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    /// Byte range into [`NormalizedText::text`].
    pub range: Range<usize>,
}

/// Plain text plus ordered structural markers.
///
/// Spans are stored in document order and never overlap. Non-empty spans
/// are separated by a blank line in `text`; empty spans (e.g. a scanned PDF
/// page) occupy a zero-length range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub spans: Vec<Span>,
}

impl NormalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a span. Surrounding whitespace is trimmed before insertion.
    pub fn push(&mut self, kind: SpanKind, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            let at = self.text.len();
            self.spans.push(Span {
                kind,
                range: at..at,
            });
            return;
        }
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        let start = self.text.len();
        self.text.push_str(content);
        self.spans.push(Span {
            kind,
            range: start..self.text.len(),
        });
    }

    pub fn span_text(&self, span: &Span) -> &str {
        &self.text[span.range.clone()]
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A chunk produced by the chunker, before metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based, gapless within a document.
    pub index: usize,
    pub text: String,
    /// Byte offset of the chunk (overlap included) in the normalized text.
    pub start: usize,
    pub end: usize,
    /// Byte offset of the first token that is not overlap.
    pub fresh_start: usize,
    pub token_count: usize,
    pub overlap_tokens: usize,
    /// Most recent heading at `fresh_start`.
    pub section: Option<String>,
}

/// Metadata stored alongside every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub doc_type: DocKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub chunk_index: usize,
    pub content_hash: String,
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_full_pdf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
}

/// The unit written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A paper as returned by the discovery API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaperSummary {
    pub external_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub tldr: Option<String>,
    pub year: Option<i32>,
    pub citation_count: u64,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    SummaryOnly,
    FullContent,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::SummaryOnly => f.write_str("summary_only"),
            LifecycleState::FullContent => f.write_str("full_content"),
        }
    }
}

/// A paper's lifecycle view, derived from stored chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub external_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub citation_count: u64,
    pub lifecycle_state: LifecycleState,
    pub summary_chunk_ids: Vec<String>,
    pub full_chunk_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocKind::from_extension("MD"), Some(DocKind::Markdown));
        assert_eq!(DocKind::from_extension("htm"), Some(DocKind::Html));
        assert_eq!(DocKind::from_extension("pdf"), Some(DocKind::Pdf));
        assert_eq!(DocKind::from_extension("docx"), None);
    }

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(
            DocKind::from_content_type("text/html; charset=utf-8"),
            Some(DocKind::Html)
        );
        assert_eq!(
            DocKind::from_content_type("application/pdf"),
            Some(DocKind::Pdf)
        );
        assert_eq!(DocKind::from_content_type("image/png"), None);
    }

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in [
            DocKind::Pdf,
            DocKind::Markdown,
            DocKind::Html,
            DocKind::Text,
            DocKind::PaperSummary,
        ] {
            assert_eq!(DocKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_normalized_push_separates_spans() {
        let mut n = NormalizedText::new();
        n.push(SpanKind::Paragraph, "  first  ");
        n.push(SpanKind::Paragraph, "");
        n.push(SpanKind::Paragraph, "second");
        assert_eq!(n.text, "first\n\nsecond");
        assert_eq!(n.spans.len(), 3);
        assert_eq!(n.span_text(&n.spans[0]), "first");
        assert!(n.spans[1].range.is_empty());
        assert_eq!(n.span_text(&n.spans[2]), "second");
    }
}
