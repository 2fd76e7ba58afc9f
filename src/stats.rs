//! Store statistics.
//!
//! Summarises what `ingest` and `discover` have written: chunk counts per
//! document type, the number of distinct sources, and how many papers are
//! summary-only versus full content.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source_id) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let last_write: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ragrag store stats");
    println!("==================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Sources:     {}", total_sources);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Last write:  {}",
        last_write.map(format_ts_relative).unwrap_or_else(|| "never".to_string())
    );

    let kind_rows = sqlx::query(
        r#"
        SELECT doc_type, COUNT(DISTINCT source_id) AS source_count, COUNT(*) AS chunk_count
        FROM chunks
        GROUP BY doc_type
        ORDER BY chunk_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !kind_rows.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>8} {:>8}", "TYPE", "SOURCES", "CHUNKS");
        println!("  {}", "-".repeat(34));
        for row in &kind_rows {
            let kind: String = row.get("doc_type");
            let sources: i64 = row.get("source_count");
            let chunks: i64 = row.get("chunk_count");
            println!("  {:<16} {:>8} {:>8}", kind, sources, chunks);
        }
    }

    // A paper is full content once any of its chunks carries the flag.
    let paper_row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN is_full = 1 THEN 1 ELSE 0 END), 0) AS full_count,
            COALESCE(SUM(CASE WHEN is_full = 1 THEN 0 ELSE 1 END), 0) AS summary_count
        FROM (
            SELECT external_id, MAX(COALESCE(has_full_pdf, 0)) AS is_full
            FROM chunks
            WHERE external_id IS NOT NULL
            GROUP BY external_id
        )
        "#,
    )
    .fetch_one(&pool)
    .await?;
    let full_count: i64 = paper_row.get("full_count");
    let summary_count: i64 = paper_row.get("summary_count");

    println!();
    println!("  Papers:      {}", full_count + summary_count);
    println!("    full:      {}", full_count);
    println!("    summary:   {}", summary_count);
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
