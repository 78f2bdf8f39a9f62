use super::PgStore;
use crate::BoxFuture;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};
use tracing::{info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Consent captured by a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConsent {
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub terms_version: String,
    pub terms_hash: String,
    pub ip: String,
    pub user_agent: String,
    pub source_campaign: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub cpf: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub accepted_terms: bool,
    pub terms_version: String,
    pub terms_hash: String,
    pub ip: String,
    pub user_agent: String,
    pub source_campaign: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ConsentRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            cpf: row.try_get("cpf")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            accepted_terms: row.try_get("accepted_terms")?,
            terms_version: row.try_get("terms_version")?,
            terms_hash: row.try_get("terms_hash")?,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            source_campaign: row.try_get("source_campaign")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub trait ConsentStore: Send + Sync {
    /// Append a consent record and return its id.
    fn insert<'a>(&'a self, consent: &'a NewConsent) -> BoxFuture<'a, Result<Uuid>>;

    /// Newest first.
    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<ConsentRecord>>>;

    /// Every record, oldest first, for CSV export.
    fn export(&self) -> BoxFuture<'_, Result<Vec<ConsentRecord>>>;
}

const SELECT_COLUMNS: &str = r"
    SELECT id, cpf, name, email, phone, accepted_terms, terms_version, terms_hash,
           ip, user_agent, source_campaign, created_at
    FROM consent_records
";

impl PgStore {
    async fn insert_consent(&self, consent: &NewConsent) -> Result<Uuid> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.table = "consent_records"
        );
        let id = Uuid::now_v7();
        sqlx::query(
            r"
            INSERT INTO consent_records
                (id, cpf, name, email, phone, accepted_terms, terms_version, terms_hash,
                 ip, user_agent, source_campaign)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9, $10)
            ",
        )
        .bind(id)
        .bind(&consent.cpf)
        .bind(&consent.name)
        .bind(&consent.email)
        .bind(&consent.phone)
        .bind(&consent.terms_version)
        .bind(&consent.terms_hash)
        .bind(&consent.ip)
        .bind(&consent.user_agent)
        .bind(&consent.source_campaign)
        .execute(self.pool())
        .instrument(span)
        .await
        .context("Failed to insert consent record")?;

        Ok(id)
    }

    async fn list_consents(&self, limit: i64, offset: i64) -> Result<Vec<ConsentRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "consent_records"
        );
        let query = format!("{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        sqlx::query_as::<_, ConsentRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .instrument(span)
            .await
            .context("Failed to list consent records")
    }

    async fn export_consents(&self) -> Result<Vec<ConsentRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "consent_records"
        );
        let query = format!("{SELECT_COLUMNS} ORDER BY created_at ASC");
        sqlx::query_as::<_, ConsentRecord>(&query)
            .fetch_all(self.pool())
            .instrument(span)
            .await
            .context("Failed to export consent records")
    }
}

impl ConsentStore for PgStore {
    fn insert<'a>(&'a self, consent: &'a NewConsent) -> BoxFuture<'a, Result<Uuid>> {
        Box::pin(self.insert_consent(consent))
    }

    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<ConsentRecord>>> {
        Box::pin(self.list_consents(limit, offset))
    }

    fn export(&self) -> BoxFuture<'_, Result<Vec<ConsentRecord>>> {
        Box::pin(self.export_consents())
    }
}
