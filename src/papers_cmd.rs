//! CLI handlers for the paper commands: `discover`, `upgrade`,
//! `upgrade-top`, and `papers`.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::discovery::SemanticScholarClient;
use crate::lifecycle::{state_label, PaperLifecycleManager, UpgradeOutcome};
use crate::sqlite_store::SqliteStore;

async fn open(config: &Config) -> Result<(Arc<SqliteStore>, PaperLifecycleManager)> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let api = Arc::new(SemanticScholarClient::new(&config.discovery)?);
    let manager = PaperLifecycleManager::new(store.clone(), api, config);
    Ok((store, manager))
}

pub async fn run_discover(
    config: &Config,
    topics: Vec<String>,
    limit: Option<usize>,
    min_citations: Option<u64>,
) -> Result<()> {
    let topics = if topics.is_empty() {
        config.discovery.topics.clone()
    } else {
        topics
    };
    let per_topic = limit.unwrap_or(config.discovery.papers_per_topic);
    let min_citations = min_citations.unwrap_or(config.discovery.min_citations);

    let (store, manager) = open(config).await?;
    let report = manager.discover(&topics, per_topic, min_citations).await?;

    println!("discover");
    println!("  topics searched: {} / {}", report.searched, topics.len());
    println!("  new papers: {}", report.added.len());
    for id in &report.added {
        println!("    {}", id);
    }
    println!("  already stored: {}", report.already_known);
    println!("  duplicates: {}", report.duplicates);
    println!("  below {} citations: {}", min_citations, report.below_threshold);
    if !report.failures.is_empty() {
        println!("  failed: {}", report.failures.len());
        for (key, err) in &report.failures {
            println!("    {}: {}", key, err);
        }
    }
    println!("ok");

    store.close().await;
    Ok(())
}

pub async fn run_upgrade(config: &Config, external_id: &str) -> Result<()> {
    let (store, manager) = open(config).await?;
    let outcome = manager.upgrade(external_id).await;
    store.close().await;

    match outcome? {
        UpgradeOutcome::Upgraded { chunks, replaced } => {
            println!("upgrade {}", external_id);
            println!("  chunks written: {}", chunks);
            println!("  chunks replaced: {}", replaced);
        }
        UpgradeOutcome::AlreadyFull => {
            println!("upgrade {}", external_id);
            println!("  already full content");
        }
    }
    println!("ok");
    Ok(())
}

pub async fn run_upgrade_top(config: &Config, n: Option<usize>, min_citations: Option<u64>) -> Result<()> {
    let n = n.unwrap_or(config.upgrade.batch_size);
    let min_citations = min_citations.unwrap_or(config.upgrade.min_citations);

    let (store, manager) = open(config).await?;
    let report = manager.upgrade_top(n, min_citations).await?;

    println!("upgrade-top (n={}, min citations={})", n, min_citations);
    if report.selected.is_empty() {
        println!("  no papers meet the criteria");
    }
    for (id, chunks) in &report.upgraded {
        println!("  upgraded {} ({} chunks)", id, chunks);
    }
    for id in &report.already_full {
        println!("  {} already full", id);
    }
    for (id, err) in &report.failures {
        println!("  failed {}: {}", id, err);
    }
    println!("ok");

    store.close().await;
    Ok(())
}

pub async fn run_papers(config: &Config, summary_only: bool) -> Result<()> {
    let (store, manager) = open(config).await?;
    let mut papers = if summary_only {
        manager.summary_only_papers().await?
    } else {
        manager.papers().await?
    };
    store.close().await;
    papers.sort_by(|a, b| {
        b.citation_count
            .cmp(&a.citation_count)
            .then_with(|| a.external_id.cmp(&b.external_id))
    });

    if papers.is_empty() {
        println!("No papers stored.");
        return Ok(());
    }

    println!(
        "{:<20} {:>9} {:>6} {:<8} TITLE",
        "EXTERNAL ID", "CITATIONS", "YEAR", "STATE"
    );
    for p in &papers {
        let year = p
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:>9} {:>6} {:<8} {}",
            p.external_id,
            p.citation_count,
            year,
            state_label(p),
            p.title
        );
    }
    Ok(())
}
