use super::PgStore;
use crate::BoxFuture;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{postgres::PgRow, FromRow, Row};
use tracing::{info_span, Instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
    Blocked,
}

impl AuditOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub outcome: AuditOutcome,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Value,
}

impl AuditEntry {
    #[must_use]
    pub fn new(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            action: action.into(),
            outcome,
            ip: None,
            user_agent: None,
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditRecord {
    pub id: i64,
    pub action: String,
    pub outcome: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = Object)]
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            action: row.try_get("action")?,
            outcome: row.try_get("outcome")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub trait AuditStore: Send + Sync {
    fn append<'a>(&'a self, entry: &'a AuditEntry) -> BoxFuture<'a, Result<()>>;

    /// Newest first.
    fn list(&self, limit: i64) -> BoxFuture<'_, Result<Vec<AuditRecord>>>;
}

impl PgStore {
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.table = "audit_logs"
        );
        sqlx::query(
            r"
            INSERT INTO audit_logs (action, outcome, ip, user_agent, details)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&entry.action)
        .bind(entry.outcome.as_str())
        .bind(entry.ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(&entry.details)
        .execute(self.pool())
        .instrument(span)
        .await
        .context("Failed to append audit entry")?;
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "audit_logs"
        );
        sqlx::query_as::<_, AuditRecord>(
            r"
            SELECT id, action, outcome, ip, user_agent, details, created_at
            FROM audit_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .instrument(span)
        .await
        .context("Failed to list audit entries")
    }
}

impl AuditStore for PgStore {
    fn append<'a>(&'a self, entry: &'a AuditEntry) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.append_audit(entry))
    }

    fn list(&self, limit: i64) -> BoxFuture<'_, Result<Vec<AuditRecord>>> {
        Box::pin(self.list_audit(limit))
    }
}
