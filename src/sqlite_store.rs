//! SQLite-backed [`ChunkStore`].
//!
//! The filterable metadata fields are stored as columns; the full
//! [`ChunkMetadata`] is kept as JSON in `metadata_json` and is what reads
//! deserialize from. The `sources` table holds the content hash each
//! source was last written from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use ragrag_core::models::{ChunkMetadata, ChunkRecord};
use ragrag_core::store::{ChunkStore, MetadataFilter};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_chunk(conn: &mut SqliteConnection, chunk: &ChunkRecord, now: i64) -> Result<()> {
    let m = &chunk.metadata;
    let metadata_json = serde_json::to_string(m)?;

    sqlx::query(
        r#"
        INSERT INTO chunks (id, source_id, chunk_index, text, content_hash, doc_type,
                            section, token_count, external_id, has_full_pdf,
                            metadata_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            source_id = excluded.source_id,
            chunk_index = excluded.chunk_index,
            text = excluded.text,
            content_hash = excluded.content_hash,
            doc_type = excluded.doc_type,
            section = excluded.section,
            token_count = excluded.token_count,
            external_id = excluded.external_id,
            has_full_pdf = excluded.has_full_pdf,
            metadata_json = excluded.metadata_json
        "#,
    )
    .bind(&chunk.id)
    .bind(&m.source)
    .bind(m.chunk_index as i64)
    .bind(&chunk.text)
    .bind(&m.content_hash)
    .bind(m.doc_type.as_str())
    .bind(&m.section)
    .bind(m.token_count as i64)
    .bind(&m.external_id)
    .bind(m.has_full_pdf)
    .bind(&metadata_json)
    .bind(now)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to write chunk {} of {}", m.chunk_index, m.source))?;

    Ok(())
}

async fn record_source(
    conn: &mut SqliteConnection,
    source_id: &str,
    content_hash: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sources (source_id, content_hash, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(source_id) DO UPDATE SET
            content_hash = excluded.content_hash,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(source_id)
    .bind(content_hash)
    .bind(now)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to record source {}", source_id))?;
    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<ChunkRecord> {
    let id: String = row.get("id");
    let json: String = row.get("metadata_json");
    let metadata: ChunkMetadata = serde_json::from_str(&json)
        .with_context(|| format!("Corrupt metadata_json for chunk {}", id))?;
    Ok(ChunkRecord {
        id,
        text: row.get("text"),
        metadata,
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            insert_chunk(&mut tx, chunk, now).await?;
            record_source(&mut tx, &chunk.metadata.source, &chunk.metadata.content_hash, now)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sources WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query_by_metadata(&self, filter: &MetadataFilter) -> Result<Vec<ChunkRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, text, metadata_json FROM chunks WHERE 1 = 1");
        if let Some(source) = &filter.source_id {
            qb.push(" AND source_id = ").push_bind(source.clone());
        }
        if let Some(kind) = filter.doc_type {
            qb.push(" AND doc_type = ").push_bind(kind.as_str());
        }
        if let Some(external_id) = &filter.external_id {
            qb.push(" AND external_id = ").push_bind(external_id.clone());
        }
        if let Some(full) = filter.has_full_pdf {
            qb.push(" AND has_full_pdf = ").push_bind(full);
        }
        qb.push(" ORDER BY source_id, chunk_index");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn exists(&self, source_id: &str, content_hash: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sources WHERE source_id = ? AND content_hash = ?)",
        )
        .bind(source_id)
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    /// Delete, insert and record the hash inside one transaction.
    async fn replace_source(
        &self,
        source_id: &str,
        content_hash: &str,
        chunks: &[ChunkRecord],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            insert_chunk(&mut tx, chunk, now).await?;
        }
        record_source(&mut tx, source_id, content_hash, now).await?;

        tx.commit().await?;
        Ok(())
    }
}
