//! Incremental ingestion.
//!
//! For every candidate document the coordinator hashes the raw bytes and
//! asks the store whether that exact `(source_id, hash)` is already present.
//! If so the document is skipped without parsing. Otherwise it runs
//! parse → chunk → metadata and replaces the source's whole chunk set, so
//! chunks from an older version never linger.
//!
//! One document failing (unreadable, unparsable, store write rejected) never
//! aborts the batch; failures are collected in the [`IngestReport`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use ragrag_core::chunk::{chunk_text, ChunkerConfig};
use ragrag_core::metadata::{MetadataBuilder, PaperTag};
use ragrag_core::models::{ChunkRecord, DocKind, Document};
use ragrag_core::store::ChunkStore;

use crate::config::{Config, CorpusConfig};
use crate::connector_fs::{self, CorpusFile};
use crate::extract::{self, ParseError};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("store lookup failed: {0:#}")]
    StoreRead(#[source] anyhow::Error),
    #[error("store write failed: {0:#}")]
    StoreWrite(#[source] anyhow::Error),
}

#[derive(Debug)]
pub enum IngestOutcome {
    Ingested { chunks: usize },
    Unchanged,
    Failed(IngestError),
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: usize,
    pub unchanged: usize,
    pub failures: Vec<(String, IngestError)>,
    pub chunks_written: usize,
}

impl IngestReport {
    fn record(&mut self, source_id: &str, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Ingested { chunks } => {
                self.ingested += 1;
                self.chunks_written += chunks;
            }
            IngestOutcome::Unchanged => self.unchanged += 1,
            IngestOutcome::Failed(err) => self.failures.push((source_id.to_string(), err)),
        }
    }

    pub fn seen(&self) -> usize {
        self.ingested + self.unchanged + self.failures.len()
    }
}

/// `ragrag ingest [PATH]`: ingest into the configured SQLite store and
/// print a summary.
pub async fn run_ingest(config: &Config, path: Option<&Path>) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let root = path.unwrap_or(config.corpus.root.as_path());

    let coordinator = IncrementalIngestionCoordinator::new(store.clone(), config);
    let report = coordinator.ingest(root).await?;

    println!("ingest {}", root.display());
    println!("  documents seen: {}", report.seen());
    println!("  ingested: {}", report.ingested);
    println!("  unchanged: {}", report.unchanged);
    println!("  chunks written: {}", report.chunks_written);
    if !report.failures.is_empty() {
        println!("  failed: {}", report.failures.len());
        for (source_id, err) in &report.failures {
            println!("    {}: {}", source_id, err);
        }
    }
    println!("ok");

    store.close().await;
    Ok(())
}

/// Parse, chunk and tag one document.
///
/// Shared by corpus ingestion and paper upgrades.
pub fn prepare_document(
    doc: &Document,
    chunker: &ChunkerConfig,
    paper: Option<PaperTag>,
) -> Result<Vec<ChunkRecord>, ParseError> {
    let normalized = extract::parse(doc)?;
    let chunks = chunk_text(&normalized, chunker);
    let mut builder = MetadataBuilder::for_document(doc);
    if let Some(tag) = paper {
        builder = builder.with_paper(tag);
    }
    Ok(builder.build_all(chunks))
}

pub struct IncrementalIngestionCoordinator {
    store: Arc<dyn ChunkStore>,
    chunker: ChunkerConfig,
    corpus: CorpusConfig,
    papers_dir: PathBuf,
}

impl IncrementalIngestionCoordinator {
    pub fn new(store: Arc<dyn ChunkStore>, config: &Config) -> Self {
        Self {
            store,
            chunker: config.chunking.chunker(),
            corpus: config.corpus.clone(),
            papers_dir: config.upgrade.papers_dir.clone(),
        }
    }

    /// Ingest a corpus directory or a single file.
    ///
    /// Returns `Err` only when `path` itself cannot be read.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let files = if path.is_file() {
            let kind = DocKind::from_path(path).ok_or_else(|| {
                anyhow::Error::new(ParseError::UnsupportedKind(path.display().to_string()))
            })?;
            vec![CorpusFile {
                path: path.to_path_buf(),
                source_id: connector_fs::source_id_for(path, &self.corpus.root),
                kind,
            }]
        } else {
            // Source ids stay relative to the corpus root when a subdirectory is given.
            connector_fs::scan_corpus(path, &self.corpus, std::slice::from_ref(&self.papers_dir))?
                .into_iter()
                .map(|mut file| {
                    file.source_id = connector_fs::source_id_for(&file.path, &self.corpus.root);
                    file
                })
                .collect()
        };

        info!(root = %path.display(), candidates = files.len(), "ingest started");
        let mut report = IngestReport::default();
        for file in &files {
            let outcome = self.ingest_file(file).await;
            report.record(&file.source_id, outcome);
        }
        info!(
            ingested = report.ingested,
            unchanged = report.unchanged,
            failed = report.failures.len(),
            chunks = report.chunks_written,
            "ingest finished"
        );
        Ok(report)
    }

    async fn ingest_file(&self, file: &CorpusFile) -> IngestOutcome {
        let raw = match tokio::fs::read(&file.path).await {
            Ok(raw) => raw,
            Err(source) => {
                warn!(source_id = %file.source_id, error = %source, "read failed");
                return IngestOutcome::Failed(IngestError::Read {
                    path: file.path.display().to_string(),
                    source,
                });
            }
        };
        let doc = Document::new(file.source_id.clone(), file.kind, raw);
        self.ingest_document(&doc).await
    }

    /// Ingest one in-memory document.
    pub async fn ingest_document(&self, doc: &Document) -> IngestOutcome {
        match self.store.exists(&doc.source_id, &doc.content_hash).await {
            Ok(true) => {
                debug!(source_id = %doc.source_id, "unchanged");
                return IngestOutcome::Unchanged;
            }
            Ok(false) => {}
            Err(e) => return IngestOutcome::Failed(IngestError::StoreRead(e)),
        }

        let records = match prepare_document(doc, &self.chunker, None) {
            Ok(records) => records,
            Err(e) => {
                warn!(source_id = %doc.source_id, error = %e, "parse failed, skipping");
                return IngestOutcome::Failed(e.into());
            }
        };

        if let Err(e) = self
            .store
            .replace_source(&doc.source_id, &doc.content_hash, &records)
            .await
        {
            warn!(source_id = %doc.source_id, error = %e, "store write failed");
            return IngestOutcome::Failed(IngestError::StoreWrite(e));
        }

        debug!(source_id = %doc.source_id, chunks = records.len(), "ingested");
        IngestOutcome::Ingested {
            chunks: records.len(),
        }
    }
}
