use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, types::Json};

use super::DocumentStore;
use super::models::{ClusterRecord, Document, DocumentKind, Label};

/// Postgres 上のドキュメントストア。
///
/// テーブル名と列名は [`DocumentKind`] が返す固定の識別子のみを使う。
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    kind: DocumentKind,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool, kind: DocumentKind) -> Self {
        Self { pool, kind }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn update_sql(&self) -> String {
        format!(
            "UPDATE {table} SET {label} = $1 WHERE id = $2 AND {group} = $3",
            table = self.kind.table(),
            label = self.kind.label_column(),
            group = self.kind.group_column(),
        )
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn list_groups(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {group} AS group_key FROM {table} ORDER BY {group}",
            group = self.kind.group_column(),
            table = self.kind.table(),
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to list document groups")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("group_key").context("invalid group key"))
            .collect()
    }

    async fn fetch_documents(&self, group_key: &str) -> Result<Vec<Document>> {
        let sql = format!(
            r"
            SELECT id, title, content, published_at
            FROM {table}
            WHERE {group} = $1
            ORDER BY published_at, id
            ",
            table = self.kind.table(),
            group = self.kind.group_column(),
        );
        let rows = sqlx::query(&sql)
            .bind(group_key)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to fetch documents for group {group_key}"))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let title: Option<String> = row.try_get("title")?;
            let content: Option<String> = row.try_get("content")?;
            let published_at: DateTime<Utc> = row.try_get("published_at")?;
            documents.push(Document::new(
                id,
                title.unwrap_or_default(),
                content.unwrap_or_default(),
                published_at,
            ));
        }
        Ok(documents)
    }

    async fn update_label(&self, group_key: &str, document_id: &str, label: &Label) -> Result<()> {
        let result = sqlx::query(&self.update_sql())
            .bind(self.kind.label_value(group_key, label))
            .bind(document_id)
            .bind(group_key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update label of document {document_id}"))?;
        ensure_updated(result.rows_affected(), group_key, document_id)
    }

    async fn update_labels(&self, group_key: &str, labels: &[(String, Label)]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }

        let sql = self.update_sql();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        for (document_id, label) in labels {
            let result = sqlx::query(&sql)
                .bind(self.kind.label_value(group_key, label))
                .bind(document_id)
                .bind(group_key)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to update label of document {document_id}"))?;
            // 途中で失敗した場合 tx は drop 時にロールバックされる
            ensure_updated(result.rows_affected(), group_key, document_id)?;
        }
        tx.commit().await.context("failed to commit label updates")?;
        Ok(())
    }

    async fn save_cluster(&self, record: &ClusterRecord) -> Result<()> {
        let size = i64::try_from(record.size).context("cluster size out of range")?;
        sqlx::query(
            r"
            INSERT INTO cluster_records
                (cluster_id, document_kind, group_key, created_at, size, score, keywords)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (cluster_id) DO UPDATE SET
                size = EXCLUDED.size,
                score = EXCLUDED.score,
                keywords = EXCLUDED.keywords
            ",
        )
        .bind(record.cluster_id.as_uuid())
        .bind(self.kind.as_str())
        .bind(&record.group_key)
        .bind(record.created_at)
        .bind(size)
        .bind(record.score)
        .bind(Json(&record.keywords))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save cluster record {}", record.cluster_id))?;
        Ok(())
    }
}

fn ensure_updated(rows_affected: u64, group_key: &str, document_id: &str) -> Result<()> {
    if rows_affected == 0 {
        bail!("document {document_id} not found in group {group_key}");
    }
    Ok(())
}
