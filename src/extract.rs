//! Format parsing: raw document bytes → [`NormalizedText`].
//!
//! One entry point per [`DocKind`]. Structure that the chunker needs
//! (headings, paragraphs, never-split blocks) is carried as spans; all
//! other markup is dropped. Parsing is a pure function of the bytes and
//! never panics on malformed input.

use ragrag_core::models::{DocKind, Document, NormalizedText, SpanKind};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported document kind: {0}")]
    UnsupportedKind(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("document has no extractable structure")]
    Empty,
}

/// Elements whose content is never indexed.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "iframe",
];

/// Elements that end the paragraph in progress.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "blockquote", "section", "article", "td", "th", "tr", "dt", "dd",
    "figcaption", "table", "ul", "ol", "header", "footer", "main", "nav", "aside", "br", "hr",
];

pub fn parse(doc: &Document) -> Result<NormalizedText, ParseError> {
    parse_bytes(doc.kind, &doc.raw)
}

pub fn parse_bytes(kind: DocKind, bytes: &[u8]) -> Result<NormalizedText, ParseError> {
    match kind {
        DocKind::Pdf => parse_pdf(bytes),
        DocKind::Markdown => parse_markdown(std::str::from_utf8(bytes)?),
        DocKind::Html => parse_html(std::str::from_utf8(bytes)?),
        DocKind::Text | DocKind::PaperSummary => parse_plain(std::str::from_utf8(bytes)?),
    }
}

// ---- PDF ----

fn parse_pdf(bytes: &[u8]) -> Result<NormalizedText, ParseError> {
    let pages = match pdf_pages_lopdf(bytes) {
        Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => pages,
        // No page tree at all: only accept the fallback if it finds text.
        Ok(pages) if pages.is_empty() => pdf_pages_fallback(bytes)
            .ok()
            .filter(|p| p.iter().any(|t| !t.trim().is_empty()))
            .ok_or(ParseError::Empty)?,
        // Pages parsed but none has text, as in a scanned PDF. Keep the empty
        // pages unless the fallback finds something.
        Ok(pages) => match pdf_pages_fallback(bytes) {
            Ok(text) if text.iter().any(|t| !t.trim().is_empty()) => text,
            Ok(_) | Err(_) => pages,
        },
        Err(_) => pdf_pages_fallback(bytes)?,
    };

    let mut out = NormalizedText::new();
    for page in &pages {
        if page.trim().is_empty() {
            out.push(SpanKind::Paragraph, "");
            continue;
        }
        push_paragraphs(&mut out, page);
    }
    Ok(out)
}

fn pdf_pages_lopdf(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))?;
    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for n in page_numbers {
        // A single unreadable page is recorded as empty.
        pages.push(document.extract_text(&[n]).unwrap_or_default());
    }
    Ok(pages)
}

fn pdf_pages_fallback(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    // pdf-extract panics on some malformed inputs.
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ParseError::Pdf("text extraction panicked".to_string()))?
        .map_err(|e| ParseError::Pdf(e.to_string()))?;
    Ok(text.split('\u{c}').map(str::to_string).collect())
}

// ---- Markdown ----

fn atx_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((level as u8, title))
}

/// The fence marker (run of ``` or ~~~) that opens a code block.
fn fence_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for ch in ['`', '~'] {
        let len = trimmed.chars().take_while(|&c| c == ch).count();
        if len >= 3 {
            return Some(&trimmed[..len]);
        }
    }
    None
}

/// A closing fence is only fence characters, at least as many as the opener.
fn closes_fence(line: &str, opener: &str) -> bool {
    let trimmed = line.trim();
    let Some(ch) = opener.chars().next() else {
        return false;
    };
    trimmed.len() >= opener.len() && trimmed.chars().all(|c| c == ch)
}

fn parse_markdown(src: &str) -> Result<NormalizedText, ParseError> {
    let mut out = NormalizedText::new();
    let mut para: Vec<&str> = Vec::new();
    let mut lines = src.lines();

    while let Some(line) = lines.next() {
        if let Some(marker) = fence_marker(line) {
            flush_lines(&mut out, &mut para);
            let mut block = vec![line];
            for inner in lines.by_ref() {
                block.push(inner);
                if closes_fence(inner, marker) {
                    break;
                }
            }
            out.push(SpanKind::Atomic, &block.join("\n"));
        } else if let Some((level, title)) = atx_heading(line) {
            flush_lines(&mut out, &mut para);
            out.push(SpanKind::Heading { level }, title);
        } else if line.trim().is_empty() {
            flush_lines(&mut out, &mut para);
        } else {
            para.push(line);
        }
    }
    flush_lines(&mut out, &mut para);
    Ok(out)
}

fn flush_lines(out: &mut NormalizedText, lines: &mut Vec<&str>) {
    if !lines.is_empty() {
        out.push(SpanKind::Paragraph, &lines.join("\n"));
        lines.clear();
    }
}

// ---- HTML ----

struct HtmlWalker {
    out: NormalizedText,
    buf: String,
}

impl HtmlWalker {
    fn flush(&mut self) {
        let text = collapse_whitespace(&self.buf);
        if !text.is_empty() {
            self.out.push(SpanKind::Paragraph, &text);
        }
        self.buf.clear();
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if SKIPPED_TAGS.contains(&name) {
            return;
        }

        if let Some(level) = heading_level(name) {
            self.flush();
            let title = collapse_whitespace(&element.text().collect::<String>());
            self.out.push(SpanKind::Heading { level }, &title);
            return;
        }
        if name == "pre" {
            self.flush();
            let code: String = element.text().collect();
            self.out.push(SpanKind::Atomic, &code);
            return;
        }

        let is_block = BLOCK_TAGS.contains(&name);
        if is_block {
            self.flush();
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    self.buf.push_str(text);
                }
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.walk(child_element);
                    }
                }
                _ => {}
            }
        }
        if is_block {
            self.flush();
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_html(src: &str) -> Result<NormalizedText, ParseError> {
    let document = Html::parse_document(src);
    let mut walker = HtmlWalker {
        out: NormalizedText::new(),
        buf: String::new(),
    };
    walker.walk(document.root_element());
    walker.flush();
    Ok(walker.out)
}

// ---- Plain text ----

fn parse_plain(src: &str) -> Result<NormalizedText, ParseError> {
    let mut out = NormalizedText::new();
    push_paragraphs(&mut out, src);
    Ok(out)
}

/// Push blank-line-delimited paragraphs of `text`.
fn push_paragraphs(out: &mut NormalizedText, text: &str) {
    let mut para: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_lines(out, &mut para);
        } else {
            para.push(line);
        }
    }
    flush_lines(out, &mut para);
}
