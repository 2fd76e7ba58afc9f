//! Paper lifecycle rules that need no I/O.
//!
//! - [`summary_text`] renders the single summary chunk for a discovered paper.
//! - [`derive_records`] rebuilds [`PaperRecord`]s from stored chunk metadata;
//!   the store is the source of truth for lifecycle state.
//! - [`select_for_upgrade`] implements the batch-upgrade policy.

use std::collections::BTreeMap;

use crate::hash::content_hash;
use crate::metadata::{MetadataBuilder, PaperTag};
use crate::models::{
    ChunkRecord, DocKind, LifecycleState, PaperRecord, PaperSummary, TextChunk,
};

/// Authors listed by name before collapsing to "et al.".
const MAX_LISTED_AUTHORS: usize = 5;

/// Prefix for paper source ids in the store.
pub const PAPER_SOURCE_PREFIX: &str = "paper:";

/// Source id shared by a paper's summary and full-content chunk sets.
pub fn paper_source_id(external_id: &str) -> String {
    format!("{}{}", PAPER_SOURCE_PREFIX, external_id)
}

/// Render the retrieval text for a paper summary chunk.
pub fn summary_text(paper: &PaperSummary) -> String {
    let mut parts = Vec::new();

    let title = if paper.title.trim().is_empty() {
        "Unknown Title"
    } else {
        paper.title.trim()
    };
    parts.push(format!("Title: {}", title));

    if !paper.authors.is_empty() {
        let mut names = paper
            .authors
            .iter()
            .take(MAX_LISTED_AUTHORS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if paper.authors.len() > MAX_LISTED_AUTHORS {
            names.push_str(&format!(" et al. ({} authors)", paper.authors.len()));
        }
        parts.push(format!("Authors: {}", names));
    }

    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    parts.push(format!(
        "Year: {} | Citations: {}",
        year, paper.citation_count
    ));

    if !paper.external_id.contains(':') {
        parts.push(format!("ArXiv: {}", paper.external_id));
    }
    if let Some(tldr) = paper.tldr.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("Summary: {}", tldr.trim()));
    }
    if let Some(abs) = paper.abstract_text.as_deref().filter(|a| !a.trim().is_empty()) {
        parts.push(format!("Abstract: {}", abs.trim()));
    }

    parts.join("\n\n")
}

/// Build the single summary chunk a newly discovered paper is stored as.
pub fn summary_record(paper: &PaperSummary) -> ChunkRecord {
    let text = summary_text(paper);
    let hash = content_hash(&text);
    let chunk = TextChunk {
        index: 0,
        start: 0,
        end: text.len(),
        fresh_start: 0,
        token_count: text.split_whitespace().count(),
        overlap_tokens: 0,
        section: None,
        text,
    };
    MetadataBuilder::new(paper_source_id(&paper.external_id), DocKind::PaperSummary, hash)
        .with_paper(PaperTag {
            external_id: paper.external_id.clone(),
            has_full_pdf: false,
            title: Some(paper.title.clone()).filter(|t| !t.is_empty()),
            year: paper.year,
            citation_count: Some(paper.citation_count),
        })
        .build(chunk)
}

/// Group paper chunks by `external_id` and derive each paper's state.
///
/// Chunks without an `external_id` are ignored. Records come back sorted by
/// `external_id`.
pub fn derive_records(chunks: &[ChunkRecord]) -> Vec<PaperRecord> {
    let mut by_id: BTreeMap<&str, PaperRecord> = BTreeMap::new();

    for chunk in chunks {
        let Some(external_id) = chunk.metadata.external_id.as_deref() else {
            continue;
        };
        let record = by_id.entry(external_id).or_insert_with(|| PaperRecord {
            external_id: external_id.to_string(),
            title: String::new(),
            year: None,
            citation_count: 0,
            lifecycle_state: LifecycleState::SummaryOnly,
            summary_chunk_ids: Vec::new(),
            full_chunk_ids: Vec::new(),
        });

        if record.title.is_empty() {
            if let Some(title) = &chunk.metadata.title {
                record.title = title.clone();
            }
        }
        record.year = record.year.or(chunk.metadata.year);
        if let Some(c) = chunk.metadata.citation_count {
            record.citation_count = record.citation_count.max(c);
        }

        if chunk.metadata.has_full_pdf == Some(true) {
            record.full_chunk_ids.push(chunk.id.clone());
            record.lifecycle_state = LifecycleState::FullContent;
        } else {
            record.summary_chunk_ids.push(chunk.id.clone());
        }
    }

    by_id.into_values().collect()
}

/// Pick the papers a batch upgrade should process.
///
/// Summary-only papers with at least `min_citations` citations, sorted by
/// citation count descending with ties broken by `external_id` ascending,
/// truncated to `n`.
pub fn select_for_upgrade(records: &[PaperRecord], n: usize, min_citations: u64) -> Vec<PaperRecord> {
    let mut eligible: Vec<PaperRecord> = records
        .iter()
        .filter(|r| r.lifecycle_state == LifecycleState::SummaryOnly)
        .filter(|r| r.citation_count >= min_citations)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| {
        b.citation_count
            .cmp(&a.citation_count)
            .then_with(|| a.external_id.cmp(&b.external_id))
    });
    eligible.truncate(n);
    eligible
}
