//! # ragrag
//!
//! A local ingestion pipeline that keeps a chunk store in sync with a
//! directory of documents and a set of academic papers.
//!
//! Local files (PDF, Markdown, HTML, plain text) are parsed into structural
//! spans, cut into overlapping chunks, and written to SQLite. Re-ingesting an
//! unchanged file is a no-op; editing a file replaces its whole chunk set.
//!
//! Papers are discovered from Semantic Scholar and stored first as a single
//! summary chunk. The most cited ones can later be upgraded: the full text is
//! downloaded, chunked, and swapped in for the summary.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Corpus dir  │──▶│ Parse+Chunk  │──▶│  SQLite   │
//! └─────────────┘   └──────────────┘   │  chunks   │
//! ┌─────────────┐   ┌──────────────┐   │           │
//! │ S2 search   │──▶│ Summary/Full │──▶│           │
//! └─────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Corpus directory scanner |
//! | [`extract`] | Per-format text and span extraction |
//! | [`ingest`] | Incremental ingestion coordinator |
//! | [`discovery`] | Semantic Scholar client |
//! | [`ratelimit`] | Request pacing and retry with backoff |
//! | [`lifecycle`] | Paper discovery and summary → full upgrade |
//! | [`sqlite_store`] | SQLite chunk store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`stats`] | Store statistics |
//!
//! Chunking, metadata, hashing and the store trait live in `ragrag-core`.

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod discovery;
pub mod extract;
pub mod ingest;
pub mod lifecycle;
pub mod migrate;
pub mod papers_cmd;
pub mod ratelimit;
pub mod sqlite_store;
pub mod stats;
