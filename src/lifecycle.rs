//! Paper lifecycle: discovery and upgrade.
//!
//! A discovered paper is stored as a single summary chunk. Upgrading it
//! fetches the full document, chunks it, and swaps the summary out for the
//! full-content chunks in one `replace_source` call. Summary and full chunks
//! share the `paper:<external_id>` source, so at most one of the two sets is
//! ever stored for a paper. If anything fails before the swap the summary
//! stays in place.
//!
//! Lifecycle state is never cached here: it is derived from the store on
//! every call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{info, warn};

use ragrag_core::chunk::ChunkerConfig;
use ragrag_core::metadata::PaperTag;
use ragrag_core::models::{DocKind, Document, LifecycleState, PaperRecord};
use ragrag_core::papers::{derive_records, paper_source_id, select_for_upgrade, summary_record};
use ragrag_core::store::{ChunkStore, MetadataFilter};

use crate::config::Config;
use crate::discovery::{DiscoveryApi, DiscoveryError, FullDocument};
use crate::extract::ParseError;
use crate::ingest::prepare_document;

/// Kinds probed, in order, when looking for an already-downloaded paper.
const LOCAL_KINDS: [DocKind; 4] = [DocKind::Pdf, DocKind::Markdown, DocKind::Html, DocKind::Text];

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("failed to parse full document: {0}")]
    Parse(#[from] ParseError),
    #[error("store read failed: {0:#}")]
    StoreRead(#[source] anyhow::Error),
    #[error("store write failed: {0:#}")]
    StoreWrite(#[source] anyhow::Error),
    #[error("paper file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("full document for {0} has no extractable text")]
    NoContent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded { chunks: usize, replaced: usize },
    /// Already full content from the same bytes; nothing written.
    AlreadyFull,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub searched: usize,
    pub added: Vec<String>,
    pub already_known: usize,
    pub duplicates: usize,
    pub below_threshold: usize,
    /// Keyed by topic for search failures, by external id for store failures.
    pub failures: Vec<(String, LifecycleError)>,
}

#[derive(Debug, Default)]
pub struct UpgradeReport {
    /// External ids chosen by the selection policy, in priority order.
    pub selected: Vec<String>,
    pub upgraded: Vec<(String, usize)>,
    pub already_full: Vec<String>,
    pub failures: Vec<(String, LifecycleError)>,
}

pub struct PaperLifecycleManager {
    store: Arc<dyn ChunkStore>,
    api: Arc<dyn DiscoveryApi>,
    chunker: ChunkerConfig,
    papers_dir: PathBuf,
    concurrency: usize,
}

impl PaperLifecycleManager {
    pub fn new(store: Arc<dyn ChunkStore>, api: Arc<dyn DiscoveryApi>, config: &Config) -> Self {
        Self {
            store,
            api,
            chunker: config.chunking.chunker(),
            papers_dir: config.upgrade.papers_dir.clone(),
            concurrency: config.upgrade.concurrency.max(1),
        }
    }

    /// Search every topic and store a summary chunk for each new paper.
    ///
    /// Papers below `min_citations`, repeated across topics, or already in
    /// the store (in either state) are skipped.
    pub async fn discover(
        &self,
        topics: &[String],
        per_topic: usize,
        min_citations: u64,
    ) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for topic in topics {
            info!(topic = %topic, "searching");
            let papers = match self.api.search(topic, per_topic).await {
                Ok(papers) => papers,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "search failed");
                    report.failures.push((topic.clone(), e.into()));
                    continue;
                }
            };
            report.searched += 1;

            for paper in papers {
                if paper.citation_count < min_citations {
                    report.below_threshold += 1;
                    continue;
                }
                if !seen.insert(paper.external_id.clone()) {
                    report.duplicates += 1;
                    continue;
                }
                let existing = match self
                    .store
                    .query_by_metadata(&MetadataFilter::external_id(&paper.external_id))
                    .await
                {
                    Ok(existing) => existing,
                    Err(e) => {
                        warn!(external_id = %paper.external_id, error = %e, "store lookup failed");
                        report
                            .failures
                            .push((paper.external_id, LifecycleError::StoreRead(e)));
                        continue;
                    }
                };
                if !existing.is_empty() {
                    report.already_known += 1;
                    continue;
                }

                let record = summary_record(&paper);
                let source = record.metadata.source.clone();
                let hash = record.metadata.content_hash.clone();
                match self.store.replace_source(&source, &hash, &[record]).await {
                    Ok(()) => {
                        info!(
                            external_id = %paper.external_id,
                            citations = paper.citation_count,
                            "stored summary"
                        );
                        report.added.push(paper.external_id);
                    }
                    Err(e) => {
                        warn!(external_id = %paper.external_id, error = %e, "summary write failed");
                        report
                            .failures
                            .push((paper.external_id, LifecycleError::StoreWrite(e)));
                    }
                }
            }
        }

        Ok(report)
    }

    /// All papers known to the store, sorted by external id.
    pub async fn papers(&self) -> Result<Vec<PaperRecord>> {
        let chunks = self
            .store
            .query_by_metadata(&MetadataFilter::default())
            .await?;
        Ok(derive_records(&chunks))
    }

    pub async fn paper(&self, external_id: &str) -> Result<Option<PaperRecord>> {
        let chunks = self
            .store
            .query_by_metadata(&MetadataFilter::external_id(external_id))
            .await?;
        Ok(derive_records(&chunks).into_iter().next())
    }

    /// Papers still in summary-only state, most cited first.
    pub async fn summary_only_papers(&self) -> Result<Vec<PaperRecord>> {
        let papers = self.papers().await?;
        Ok(select_for_upgrade(&papers, usize::MAX, 0))
    }

    /// Replace a paper's summary with chunks of its full document.
    pub async fn upgrade(&self, external_id: &str) -> Result<UpgradeOutcome, LifecycleError> {
        let source_id = paper_source_id(external_id);
        let existing = self
            .store
            .query_by_metadata(&MetadataFilter::external_id(external_id))
            .await
            .map_err(LifecycleError::StoreRead)?;
        let record = derive_records(&existing).into_iter().next();
        let tag = PaperTag {
            external_id: external_id.to_string(),
            has_full_pdf: true,
            title: record
                .as_ref()
                .map(|r| r.title.clone())
                .filter(|t| !t.is_empty()),
            year: record.as_ref().and_then(|r| r.year),
            citation_count: record.as_ref().map(|r| r.citation_count),
        };

        // A saved file that no longer parses is removed and fetched once more.
        let mut saved = self.read_saved(external_id).await?;
        let (doc, records) = loop {
            let (kind, bytes, saved_path) = match saved.take() {
                Some((kind, bytes, path)) => (kind, bytes, Some(path)),
                None => {
                    let (kind, bytes) = self.download(external_id).await?;
                    (kind, bytes, None)
                }
            };
            let doc = Document::new(source_id.clone(), kind, bytes);

            let already_full = existing.iter().any(|c| {
                c.metadata.has_full_pdf == Some(true) && c.metadata.content_hash == doc.content_hash
            });
            if already_full {
                info!(external_id, "already full content, nothing to do");
                return Ok(UpgradeOutcome::AlreadyFull);
            }

            match prepare_document(&doc, &self.chunker, Some(tag.clone())) {
                Ok(records) => break (doc, records),
                Err(e) => match saved_path {
                    Some(path) => {
                        warn!(
                            external_id,
                            path = %path.display(),
                            error = %e,
                            "saved paper unreadable, downloading again"
                        );
                        tokio::fs::remove_file(&path).await?;
                    }
                    None => return Err(e.into()),
                },
            }
        };
        if records.is_empty() {
            return Err(LifecycleError::NoContent(external_id.to_string()));
        }

        self.store
            .replace_source(&source_id, &doc.content_hash, &records)
            .await
            .map_err(LifecycleError::StoreWrite)?;

        info!(
            external_id,
            chunks = records.len(),
            replaced = existing.len(),
            "upgraded to full content"
        );
        Ok(UpgradeOutcome::Upgraded {
            chunks: records.len(),
            replaced: existing.len(),
        })
    }

    /// Upgrade the `n` most cited summary-only papers with at least
    /// `min_citations` citations, up to `concurrency` at a time.
    pub async fn upgrade_top(&self, n: usize, min_citations: u64) -> Result<UpgradeReport> {
        let papers = self.papers().await?;
        let selected = select_for_upgrade(&papers, n, min_citations);
        info!(
            eligible = selected.len(),
            concurrency = self.concurrency,
            "batch upgrade"
        );

        let mut report = UpgradeReport {
            selected: selected.iter().map(|p| p.external_id.clone()).collect(),
            ..Default::default()
        };

        let mut results: Vec<(usize, String, Result<UpgradeOutcome, LifecycleError>)> =
            stream::iter(selected.into_iter().enumerate())
                .map(|(pos, paper)| async move {
                    let outcome = self.upgrade(&paper.external_id).await;
                    (pos, paper.external_id, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(pos, _, _)| *pos);

        for (_, external_id, outcome) in results {
            match outcome {
                Ok(UpgradeOutcome::Upgraded { chunks, .. }) => report.upgraded.push((external_id, chunks)),
                Ok(UpgradeOutcome::AlreadyFull) => report.already_full.push(external_id),
                Err(e) => {
                    warn!(external_id = %external_id, error = %e, "upgrade failed");
                    report.failures.push((external_id, e));
                }
            }
        }
        Ok(report)
    }

    /// A previously downloaded copy of the paper, if any.
    async fn read_saved(
        &self,
        external_id: &str,
    ) -> Result<Option<(DocKind, Vec<u8>, PathBuf)>, LifecycleError> {
        let stem = local_file_stem(external_id);
        for kind in LOCAL_KINDS {
            let path = self.papers_dir.join(format!("{}.{}", stem, kind.extension()));
            if tokio::fs::metadata(&path).await.is_ok() {
                info!(external_id, path = %path.display(), "reusing downloaded paper");
                let bytes = tokio::fs::read(&path).await?;
                return Ok(Some((kind, bytes, path)));
            }
        }
        Ok(None)
    }

    /// Fetch the full document and save it under the papers directory.
    ///
    /// The bytes go to a `.part` file first and are renamed into place, so an
    /// interrupted write never leaves a truncated paper at the final path.
    async fn download(&self, external_id: &str) -> Result<(DocKind, Vec<u8>), LifecycleError> {
        let FullDocument {
            bytes,
            content_type,
        } = self.api.fetch_full_document(external_id).await?;
        let kind = content_type
            .as_deref()
            .and_then(DocKind::from_content_type)
            .unwrap_or(DocKind::Pdf);

        tokio::fs::create_dir_all(&self.papers_dir).await?;
        let file_name = format!("{}.{}", local_file_stem(external_id), kind.extension());
        let path = self.papers_dir.join(&file_name);
        let partial = self.papers_dir.join(format!("{}.part", file_name));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;
        info!(external_id, path = %path.display(), bytes = bytes.len(), "saved paper");

        Ok((kind, bytes))
    }
}

/// File name stem for a paper; old-style arXiv ids contain `/`.
pub fn local_file_stem(external_id: &str) -> String {
    external_id.replace('/', "_")
}

/// Lifecycle state as shown to users.
pub fn state_label(record: &PaperRecord) -> &'static str {
    match record.lifecycle_state {
        LifecycleState::SummaryOnly => "summary",
        LifecycleState::FullContent => "full",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragrag_core::models::{ChunkRecord, PaperSummary};
    use ragrag_core::store::memory::InMemoryStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDiscovery {
        results: HashMap<String, Vec<PaperSummary>>,
        documents: HashMap<String, FullDocument>,
        failing_topics: HashSet<String>,
        throttled_fetches: HashSet<String>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl DiscoveryApi for FakeDiscovery {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperSummary>, DiscoveryError> {
            if self.failing_topics.contains(query) {
                return Err(DiscoveryError::RateLimitExhausted {
                    attempts: 3,
                    last: Box::new(DiscoveryError::RateLimited),
                });
            }
            let mut papers = self.results.get(query).cloned().unwrap_or_default();
            papers.truncate(limit);
            Ok(papers)
        }

        async fn fetch_full_document(&self, external_id: &str) -> Result<FullDocument, DiscoveryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.throttled_fetches.contains(external_id) {
                return Err(DiscoveryError::RateLimitExhausted {
                    attempts: 3,
                    last: Box::new(DiscoveryError::RateLimited),
                });
            }
            self.documents
                .get(external_id)
                .cloned()
                .ok_or_else(|| DiscoveryError::NotFound(external_id.to_string()))
        }
    }

    /// Fails every lookup of one external id.
    struct BrokenLookupStore {
        inner: InMemoryStore,
        broken_id: String,
    }

    #[async_trait]
    impl ChunkStore for BrokenLookupStore {
        async fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()> {
            self.inner.upsert(chunks).await
        }
        async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
            self.inner.delete_by_source(source_id).await
        }
        async fn query_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<ChunkRecord>> {
            if filter.external_id.as_deref() == Some(self.broken_id.as_str()) {
                anyhow::bail!("database is locked");
            }
            self.inner.query_by_metadata(filter).await
        }
        async fn exists(&self, source_id: &str, content_hash: &str) -> Result<bool> {
            self.inner.exists(source_id, content_hash).await
        }
        async fn replace_source(
            &self,
            source_id: &str,
            content_hash: &str,
            chunks: &[ChunkRecord],
        ) -> Result<()> {
            self.inner.replace_source(source_id, content_hash, chunks).await
        }
    }

    fn paper(id: &str, citations: u64) -> PaperSummary {
        PaperSummary {
            external_id: id.to_string(),
            title: format!("Paper {}", id),
            abstract_text: Some("An abstract.".into()),
            tldr: None,
            year: Some(2021),
            citation_count: citations,
            authors: vec!["A. Author".into()],
        }
    }

    fn markdown(body: &str) -> FullDocument {
        FullDocument {
            bytes: body.as_bytes().to_vec(),
            content_type: Some("text/markdown".into()),
        }
    }

    fn manager(api: FakeDiscovery) -> (TempDir, Arc<InMemoryStore>, Arc<FakeDiscovery>, PaperLifecycleManager) {
        let store = Arc::new(InMemoryStore::new());
        let (tmp, api, mgr) = manager_with_store(api, store.clone());
        (tmp, store, api, mgr)
    }

    fn manager_with_store(
        api: FakeDiscovery,
        store: Arc<dyn ChunkStore>,
    ) -> (TempDir, Arc<FakeDiscovery>, PaperLifecycleManager) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path().join("db.sqlite"));
        config.upgrade.papers_dir = tmp.path().join("papers");
        config.chunking.target_size = 16;
        let api = Arc::new(api);
        let mgr = PaperLifecycleManager::new(store, api.clone(), &config);
        (tmp, api, mgr)
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_discover_dedups_and_filters() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("1", 500), paper("2", 10)]);
        api.results.insert("dpr".into(), vec![paper("1", 500), paper("3", 80)]);
        api.failing_topics.insert("broken".into());
        let (_tmp, store, _api, mgr) = manager(api);

        let report = mgr
            .discover(&topics(&["rag", "broken", "dpr"]), 5, 50)
            .await
            .unwrap();
        assert_eq!(report.added, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(report.below_threshold, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.searched, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "broken");
        assert_eq!(store.len(), 2);

        let again = mgr.discover(&topics(&["rag", "dpr"]), 5, 50).await.unwrap();
        assert!(again.added.is_empty());
        assert_eq!(again.already_known, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_swaps_summary_for_full_chunks() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("2004.04906", 3000)]);
        let body = "# Intro\n\n".to_string()
            + &(0..60).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        api.documents.insert("2004.04906".into(), markdown(&body));
        let (tmp, store, api, mgr) = manager(api);

        mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();
        let before = mgr.paper("2004.04906").await.unwrap().unwrap();
        assert_eq!(before.lifecycle_state, LifecycleState::SummaryOnly);

        let outcome = mgr.upgrade("2004.04906").await.unwrap();
        let (chunks, replaced) = match outcome {
            UpgradeOutcome::Upgraded { chunks, replaced } => (chunks, replaced),
            other => panic!("expected upgrade, got {other:?}"),
        };
        assert!(chunks > 1);
        assert_eq!(replaced, 1);

        let after = mgr.paper("2004.04906").await.unwrap().unwrap();
        assert_eq!(after.lifecycle_state, LifecycleState::FullContent);
        assert!(after.summary_chunk_ids.is_empty());
        assert_eq!(after.full_chunk_ids.len(), chunks);
        assert_eq!(after.citation_count, 3000);
        assert_eq!(after.title, "Paper 2004.04906");
        assert_eq!(store.len(), chunks);
        assert!(tmp.path().join("papers/2004.04906.md").exists());

        // Second run reuses the saved file and changes nothing.
        let again = mgr.upgrade("2004.04906").await.unwrap();
        assert_eq!(again, UpgradeOutcome::AlreadyFull);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), chunks);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_summary() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("9999.0001", 100)]);
        let (_tmp, store, _api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();

        let err = mgr.upgrade("9999.0001").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Discovery(DiscoveryError::NotFound(_))));
        let rec = mgr.paper("9999.0001").await.unwrap().unwrap();
        assert_eq!(rec.lifecycle_state, LifecycleState::SummaryOnly);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_summary() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("9999.0002", 100)]);
        api.throttled_fetches.insert("9999.0002".into());
        let (tmp, store, _api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();

        let err = mgr.upgrade("9999.0002").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Discovery(DiscoveryError::RateLimitExhausted { .. })
        ));
        let rec = mgr.paper("9999.0002").await.unwrap().unwrap();
        assert_eq!(rec.lifecycle_state, LifecycleState::SummaryOnly);
        assert_eq!(store.len(), 1);
        assert!(!tmp.path().join("papers").exists());
    }

    #[tokio::test]
    async fn test_truncated_saved_paper_is_downloaded_again() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("2004.04906", 3000)]);
        api.documents
            .insert("2004.04906".into(), markdown("# Dense retrieval\n\nfull text body"));
        let (tmp, _store, api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();

        let papers = tmp.path().join("papers");
        std::fs::create_dir_all(&papers).unwrap();
        std::fs::write(papers.join("2004.04906.pdf"), b"%PDF-1.4\n1 0 obj").unwrap();

        let outcome = mgr.upgrade("2004.04906").await.unwrap();
        assert!(matches!(outcome, UpgradeOutcome::Upgraded { .. }));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert!(!papers.join("2004.04906.pdf").exists());
        assert!(papers.join("2004.04906.md").exists());
        assert!(!papers.join("2004.04906.md.part").exists());

        let again = mgr.upgrade("2004.04906").await.unwrap();
        assert_eq!(again, UpgradeOutcome::AlreadyFull);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discover_isolates_store_lookup_failure() {
        let mut api = FakeDiscovery::default();
        api.results
            .insert("rag".into(), vec![paper("1", 100), paper("2", 100), paper("3", 100)]);
        let store = Arc::new(BrokenLookupStore {
            inner: InMemoryStore::new(),
            broken_id: "2".into(),
        });
        let (_tmp, _api, mgr) = manager_with_store(api, store.clone());

        let report = mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();
        assert_eq!(report.added, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "2");
        assert!(matches!(report.failures[0].1, LifecycleError::StoreRead(_)));
        assert_eq!(store.inner.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_full_document_is_no_content() {
        let mut api = FakeDiscovery::default();
        api.results.insert("rag".into(), vec![paper("1111.2222", 100)]);
        api.documents.insert("1111.2222".into(), markdown("   \n\n"));
        let (_tmp, _store, _api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 5, 0).await.unwrap();

        let err = mgr.upgrade("1111.2222").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NoContent(_)));
        let rec = mgr.paper("1111.2222").await.unwrap().unwrap();
        assert_eq!(rec.lifecycle_state, LifecycleState::SummaryOnly);
    }

    #[tokio::test]
    async fn test_old_style_ids_get_safe_file_names() {
        let mut api = FakeDiscovery::default();
        api.documents.insert("cs/0112017".into(), markdown("full text here"));
        let (tmp, _store, _api, mgr) = manager(api);

        mgr.upgrade("cs/0112017").await.unwrap();
        assert!(tmp.path().join("papers/cs_0112017.md").exists());
        let rec = mgr.paper("cs/0112017").await.unwrap().unwrap();
        assert_eq!(rec.lifecycle_state, LifecycleState::FullContent);
    }

    #[tokio::test]
    async fn test_upgrade_top_picks_most_cited() {
        let mut api = FakeDiscovery::default();
        api.results.insert(
            "rag".into(),
            vec![paper("a", 300), paper("b", 900), paper("c", 600), paper("d", 50)],
        );
        for id in ["a", "b", "c", "d"] {
            api.documents.insert(id.into(), markdown(&format!("full text of {}", id)));
        }
        let (_tmp, _store, _api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 10, 0).await.unwrap();

        let report = mgr.upgrade_top(2, 100).await.unwrap();
        assert_eq!(report.selected, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(report.upgraded.len(), 2);
        assert!(report.failures.is_empty());

        let remaining: Vec<String> = mgr
            .summary_only_papers()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.external_id)
            .collect();
        assert_eq!(remaining, vec!["a".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn test_upgrade_top_isolates_failures() {
        let mut api = FakeDiscovery::default();
        api.results.insert(
            "rag".into(),
            vec![paper("a", 900), paper("b", 600), paper("c", 300)],
        );
        api.documents.insert("a".into(), markdown("full text of a"));
        api.documents.insert("c".into(), markdown("full text of c"));
        let (_tmp, _store, _api, mgr) = manager(api);
        mgr.discover(&topics(&["rag"]), 10, 0).await.unwrap();

        let report = mgr.upgrade_top(3, 0).await.unwrap();
        assert_eq!(report.selected, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let upgraded: Vec<&str> = report.upgraded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(upgraded, vec!["a", "c"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "b");
        assert!(matches!(
            report.failures[0].1,
            LifecycleError::Discovery(DiscoveryError::NotFound(_))
        ));

        let b = mgr.paper("b").await.unwrap().unwrap();
        assert_eq!(b.lifecycle_state, LifecycleState::SummaryOnly);
        for id in ["a", "c"] {
            let rec = mgr.paper(id).await.unwrap().unwrap();
            assert_eq!(rec.lifecycle_state, LifecycleState::FullContent);
        }
    }
}
