//! Boundary-respecting, overlapping text chunker.
//!
//! Splits a [`NormalizedText`] into [`TextChunk`]s whose size is measured in
//! whitespace-delimited tokens. Chunks are contiguous slices of the
//! normalized text, so `chunk.text == normalized.text[chunk.start..chunk.end]`
//! always holds.
//!
//! # Algorithm
//!
//! 1. Walk spans in order, turning each into one or more packing units:
//!    - atomic spans (fenced code) become a single unit, whatever their size;
//!    - spans within `target_size` become a single unit;
//!    - larger spans are split at sentence boundaries, and sentences that are
//!      still too large are hard-split at the token budget.
//! 2. Accumulate units into the open chunk until the next unit would push the
//!    chunk's fresh (non-overlap) token count past `target_size`, then close
//!    it. Units cut from one oversized paragraph pack with each other but
//!    never with a neighbouring paragraph. A heading directly before an
//!    oversized paragraph joins that paragraph's group, so it opens the
//!    paragraph's first chunk instead of being emitted alone.
//! 3. Seed the next chunk with the trailing `overlap_fraction × target_size`
//!    tokens of the closed chunk. Overlap never reaches back into an atomic
//!    span.
//!
//! The chunker is a pure function of its inputs; identical text and
//! parameters always give identical output, which is what keeps chunk ids
//! stable across runs.
//!
//! # Example
//!
//! ```rust
//! use ragrag_core::chunk::{chunk_text, ChunkerConfig};
//! use ragrag_core::models::{NormalizedText, SpanKind};
//!
//! let mut text = NormalizedText::new();
//! text.push(SpanKind::Paragraph, "Hello world.");
//! text.push(SpanKind::Paragraph, "Second paragraph.");
//!
//! let chunks = chunk_text(&text, &ChunkerConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! assert_eq!(chunks[0].overlap_tokens, 0);
//! ```

use std::ops::Range;

use crate::models::{NormalizedText, SpanKind, TextChunk};

pub const DEFAULT_TARGET_SIZE: usize = 512;
pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.1;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkerConfig {
    /// Maximum fresh tokens per chunk.
    pub target_size: usize,
    /// Fraction of `target_size` copied from the previous chunk.
    pub overlap_fraction: f64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
        }
    }
}

impl ChunkerConfig {
    pub fn new(target_size: usize, overlap_fraction: f64) -> Self {
        Self {
            target_size,
            overlap_fraction,
        }
    }

    /// Number of tokens carried into the next chunk.
    pub fn overlap_tokens(&self) -> usize {
        let fraction = self.overlap_fraction.clamp(0.0, 1.0);
        (self.target_size as f64 * fraction).floor() as usize
    }
}

/// Byte range of one whitespace-delimited token.
type Token = (usize, usize);

/// A packing unit: a run of tokens that is never split further.
struct Unit {
    tokens: Range<usize>,
    atomic: bool,
    /// Pieces of the same oversized span share a group.
    group: Option<usize>,
    section: Option<usize>,
}

/// The chunk currently being filled.
struct OpenChunk {
    start_tok: usize,
    fresh_tok: usize,
    end_tok: usize,
    fresh_count: usize,
    /// Overlap for the next chunk may not start before this token.
    overlap_floor: usize,
    group: Option<usize>,
    section: Option<usize>,
}

/// Split `normalized` into overlapping chunks.
///
/// # Guarantees
///
/// - Empty (or whitespace-only) input yields no chunks.
/// - Indices are `0, 1, …, N-1`.
/// - Atomic spans are never split.
/// - A span within `target_size` is never split.
pub fn chunk_text(normalized: &NormalizedText, config: &ChunkerConfig) -> Vec<TextChunk> {
    let budget = config.target_size.max(1);
    let overlap = config.overlap_tokens();

    let mut tokens: Vec<Token> = Vec::new();
    let mut headings: Vec<String> = Vec::new();
    let mut units: Vec<Unit> = Vec::new();
    let mut section: Option<usize> = None;
    let mut after_heading = false;

    for (span_idx, span) in normalized.spans.iter().enumerate() {
        let span_text = normalized.span_text(span);
        let first = tokens.len();
        tokenize(span_text, span.range.start, &mut tokens);
        let last = tokens.len();
        if first == last {
            continue;
        }

        if let SpanKind::Heading { .. } = span.kind {
            headings.push(span_text.split_whitespace().collect::<Vec<_>>().join(" "));
            section = Some(headings.len() - 1);
        }

        if span.kind == SpanKind::Atomic {
            units.push(Unit {
                tokens: first..last,
                atomic: true,
                group: None,
                section,
            });
        } else if last - first <= budget {
            units.push(Unit {
                tokens: first..last,
                atomic: false,
                group: None,
                section,
            });
        } else {
            let mut lead = 0;
            if after_heading {
                if let Some(heading) = units.last_mut() {
                    heading.group = Some(span_idx);
                    lead = heading.tokens.len();
                }
            }
            for piece in split_oversized(&normalized.text, &tokens, first..last, budget, lead) {
                units.push(Unit {
                    tokens: piece,
                    atomic: false,
                    group: Some(span_idx),
                    section,
                });
            }
        }
        after_heading = matches!(span.kind, SpanKind::Heading { .. }) && last - first <= budget;
    }

    let mut chunks = Vec::new();
    let mut open: Option<OpenChunk> = None;
    let mut carry: Option<usize> = None;

    for unit in &units {
        let n = unit.tokens.len();

        if let Some(cur) = open.take() {
            if cur.group != unit.group || cur.fresh_count + n > budget {
                carry = next_overlap_start(&cur, overlap);
                let index = chunks.len();
                chunks.push(emit(normalized, &tokens, &headings, &cur, index));
            } else {
                open = Some(cur);
            }
        }

        match open.as_mut() {
            Some(cur) => {
                cur.end_tok = unit.tokens.end;
                cur.fresh_count += n;
                if unit.atomic {
                    cur.overlap_floor = unit.tokens.end;
                }
            }
            None => {
                let start_tok = carry.take().unwrap_or(unit.tokens.start);
                open = Some(OpenChunk {
                    start_tok,
                    fresh_tok: unit.tokens.start,
                    end_tok: unit.tokens.end,
                    fresh_count: n,
                    overlap_floor: if unit.atomic {
                        unit.tokens.end
                    } else {
                        unit.tokens.start
                    },
                    group: unit.group,
                    section: unit.section,
                });
            }
        }
    }

    if let Some(cur) = open {
        let index = chunks.len();
        chunks.push(emit(normalized, &tokens, &headings, &cur, index));
    }

    chunks
}

/// Collect byte ranges of whitespace-delimited tokens, offset by `base`.
fn tokenize(text: &str, base: usize, out: &mut Vec<Token>) {
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((base + s, base + i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((base + s, base + text.len()));
    }
}

/// Split an oversized span into sentence units, hard-splitting any sentence
/// that alone exceeds `budget`. A hard split of the first sentence leaves
/// room for `lead` tokens packed ahead of it.
fn split_oversized(
    text: &str,
    tokens: &[Token],
    range: Range<usize>,
    budget: usize,
    lead: usize,
) -> Vec<Range<usize>> {
    let mut sentences = Vec::new();
    let mut sentence_start = range.start;
    for i in range.clone() {
        let (s, e) = tokens[i];
        if ends_sentence(&text[s..e]) {
            sentences.push(sentence_start..i + 1);
            sentence_start = i + 1;
        }
    }
    if sentence_start < range.end {
        sentences.push(sentence_start..range.end);
    }

    let mut pieces = Vec::new();
    for sentence in sentences {
        if sentence.len() <= budget {
            pieces.push(sentence);
            continue;
        }
        let mut at = sentence.start;
        while at < sentence.end {
            let room = if pieces.is_empty() {
                budget.saturating_sub(lead).max(1)
            } else {
                budget
            };
            let end = (at + room).min(sentence.end);
            pieces.push(at..end);
            at = end;
        }
    }
    pieces
}

/// Punctuation heuristic: `.`, `!` or `?`, optionally followed by closers.
fn ends_sentence(token: &str) -> bool {
    let trimmed = token.trim_end_matches(['"', '\'', ')', ']', '}', '”', '’']);
    trimmed.ends_with(['.', '!', '?'])
}

fn next_overlap_start(closed: &OpenChunk, overlap: usize) -> Option<usize> {
    let k = overlap.min(closed.fresh_count);
    if k == 0 {
        return None;
    }
    let start = (closed.end_tok - k).max(closed.overlap_floor);
    (start < closed.end_tok).then_some(start)
}

fn emit(
    normalized: &NormalizedText,
    tokens: &[Token],
    headings: &[String],
    cur: &OpenChunk,
    index: usize,
) -> TextChunk {
    let start = tokens[cur.start_tok].0;
    let end = tokens[cur.end_tok - 1].1;
    TextChunk {
        index,
        text: normalized.text[start..end].to_string(),
        start,
        end,
        fresh_start: tokens[cur.fresh_tok].0,
        token_count: cur.end_tok - cur.start_tok,
        overlap_tokens: cur.fresh_tok - cur.start_tok,
        section: cur.section.and_then(|i| headings.get(i).cloned()),
    }
}
