use super::PgStore;
use crate::BoxFuture;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};
use tracing::{info_span, Instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ContentEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ContentEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub trait ContentStore: Send + Sync {
    /// All entries ordered by key.
    fn list(&self) -> BoxFuture<'_, Result<Vec<ContentEntry>>>;

    fn upsert<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<ContentEntry>>;

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;
}

impl PgStore {
    async fn list_content(&self) -> Result<Vec<ContentEntry>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "content_entries"
        );
        sqlx::query_as::<_, ContentEntry>(
            "SELECT key, value, updated_at FROM content_entries ORDER BY key",
        )
        .fetch_all(self.pool())
        .instrument(span)
        .await
        .context("Failed to list content entries")
    }

    async fn upsert_content(&self, key: &str, value: &str) -> Result<ContentEntry> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.table = "content_entries"
        );
        sqlx::query_as::<_, ContentEntry>(
            r"
            INSERT INTO content_entries (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .fetch_one(self.pool())
        .instrument(span)
        .await
        .context("Failed to save content entry")
    }

    async fn delete_content(&self, key: &str) -> Result<bool> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.table = "content_entries"
        );
        let result = sqlx::query("DELETE FROM content_entries WHERE key = $1")
            .bind(key)
            .execute(self.pool())
            .instrument(span)
            .await
            .context("Failed to delete content entry")?;
        Ok(result.rows_affected() > 0)
    }
}

impl ContentStore for PgStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<ContentEntry>>> {
        Box::pin(self.list_content())
    }

    fn upsert<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<ContentEntry>> {
        Box::pin(self.upsert_content(key, value))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.delete_content(key))
    }
}
