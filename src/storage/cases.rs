use super::PgStore;
use crate::BoxFuture;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::collections::HashMap;
use tracing::{info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CaseRecord {
    pub id: Uuid,
    pub numero_processo: String,
    pub reu: String,
    pub nome: Option<String>,
    pub email: Option<String>,
    pub consent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CaseRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            numero_processo: row.try_get("numero_processo")?,
            reu: row.try_get("reu")?,
            nome: row.try_get("nome")?,
            email: row.try_get("email")?,
            consent_id: row.try_get("consent_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields an admin may change on an existing case. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CaseUpdate {
    pub reu: Option<String>,
    pub nome: Option<String>,
    pub email: Option<String>,
}

impl CaseUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reu.is_none() && self.nome.is_none() && self.email.is_none()
    }
}

/// One row of a batch import, keyed by `numero_processo`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaseUpsert {
    pub numero_processo: String,
    pub reu: String,
    pub nome: Option<String>,
    pub email: Option<String>,
}

pub trait CaseStore: Send + Sync {
    /// Case whose contact email matches, compared case-insensitively.
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<CaseRecord>>>;

    fn link_consent(&self, case_id: Uuid, consent_id: Uuid) -> BoxFuture<'_, Result<()>>;

    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<CaseRecord>>>;

    fn update<'a>(
        &'a self,
        numero_processo: &'a str,
        update: &'a CaseUpdate,
    ) -> BoxFuture<'a, Result<Option<CaseRecord>>>;

    /// Insert or replace rows by `numero_processo`. Returns the number of rows written.
    fn upsert_batch<'a>(&'a self, rows: &'a [CaseUpsert]) -> BoxFuture<'a, Result<u64>>;

    fn delete<'a>(&'a self, numero_processo: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// Keep the last occurrence of each `numero_processo`, preserving first-seen order.
///
/// A single `INSERT ... ON CONFLICT` cannot touch the same row twice.
#[must_use]
pub fn dedupe_batch(rows: &[CaseUpsert]) -> Vec<CaseUpsert> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<CaseUpsert> = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(&at) = index.get(row.numero_processo.as_str()) {
            unique[at] = row.clone();
        } else {
            index.insert(&row.numero_processo, unique.len());
            unique.push(row.clone());
        }
    }
    unique
}

const SELECT_COLUMNS: &str = r"
    SELECT id, numero_processo, reu, nome, email, consent_id, created_at, updated_at
    FROM case_records
";

impl PgStore {
    async fn find_case_by_email(&self, email: &str) -> Result<Option<CaseRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "case_records"
        );
        let query = format!("{SELECT_COLUMNS} WHERE lower(email) = lower($1) ORDER BY created_at LIMIT 1");
        sqlx::query_as::<_, CaseRecord>(&query)
            .bind(email)
            .fetch_optional(self.pool())
            .instrument(span)
            .await
            .context("Failed to look up case by email")
    }

    async fn link_case_consent(&self, case_id: Uuid, consent_id: Uuid) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.table = "case_records"
        );
        sqlx::query("UPDATE case_records SET consent_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(consent_id)
            .bind(case_id)
            .execute(self.pool())
            .instrument(span)
            .await
            .context("Failed to link consent to case")?;
        Ok(())
    }

    async fn list_cases(&self, limit: i64, offset: i64) -> Result<Vec<CaseRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "case_records"
        );
        let query = format!("{SELECT_COLUMNS} ORDER BY numero_processo LIMIT $1 OFFSET $2");
        sqlx::query_as::<_, CaseRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .instrument(span)
            .await
            .context("Failed to list case records")
    }

    async fn update_case(
        &self,
        numero_processo: &str,
        update: &CaseUpdate,
    ) -> Result<Option<CaseRecord>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.table = "case_records"
        );
        sqlx::query_as::<_, CaseRecord>(
            r"
            UPDATE case_records
            SET reu = COALESCE($2, reu),
                nome = COALESCE($3, nome),
                email = COALESCE($4, email),
                updated_at = NOW()
            WHERE numero_processo = $1
            RETURNING id, numero_processo, reu, nome, email, consent_id, created_at, updated_at
            ",
        )
        .bind(numero_processo)
        .bind(update.reu.as_deref())
        .bind(update.nome.as_deref())
        .bind(update.email.as_deref())
        .fetch_optional(self.pool())
        .instrument(span)
        .await
        .context("Failed to update case record")
    }

    async fn upsert_cases(&self, rows: &[CaseUpsert]) -> Result<u64> {
        let rows = dedupe_batch(rows);
        if rows.is_empty() {
            return Ok(0);
        }

        let mut numeros = Vec::with_capacity(rows.len());
        let mut reus = Vec::with_capacity(rows.len());
        let mut nomes = Vec::with_capacity(rows.len());
        let mut emails = Vec::with_capacity(rows.len());
        for row in rows {
            numeros.push(row.numero_processo);
            reus.push(row.reu);
            nomes.push(row.nome);
            emails.push(row.email);
        }

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.table = "case_records"
        );
        let result = sqlx::query(
            r"
            INSERT INTO case_records (id, numero_processo, reu, nome, email)
            SELECT gen_random_uuid(), t.numero_processo, t.reu, t.nome, t.email
            FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[])
                AS t(numero_processo, reu, nome, email)
            ON CONFLICT (numero_processo) DO UPDATE
            SET reu = EXCLUDED.reu,
                nome = EXCLUDED.nome,
                email = EXCLUDED.email,
                updated_at = NOW()
            ",
        )
        .bind(numeros)
        .bind(reus)
        .bind(nomes)
        .bind(emails)
        .execute(self.pool())
        .instrument(span)
        .await
        .context("Failed to upsert case records")?;

        Ok(result.rows_affected())
    }

    async fn delete_case(&self, numero_processo: &str) -> Result<bool> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.table = "case_records"
        );
        let result = sqlx::query("DELETE FROM case_records WHERE numero_processo = $1")
            .bind(numero_processo)
            .execute(self.pool())
            .instrument(span)
            .await
            .context("Failed to delete case record")?;
        Ok(result.rows_affected() > 0)
    }
}

impl CaseStore for PgStore {
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<CaseRecord>>> {
        Box::pin(self.find_case_by_email(email))
    }

    fn link_consent(&self, case_id: Uuid, consent_id: Uuid) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.link_case_consent(case_id, consent_id))
    }

    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<CaseRecord>>> {
        Box::pin(self.list_cases(limit, offset))
    }

    fn update<'a>(
        &'a self,
        numero_processo: &'a str,
        update: &'a CaseUpdate,
    ) -> BoxFuture<'a, Result<Option<CaseRecord>>> {
        Box::pin(self.update_case(numero_processo, update))
    }

    fn upsert_batch<'a>(&'a self, rows: &'a [CaseUpsert]) -> BoxFuture<'a, Result<u64>> {
        Box::pin(self.upsert_cases(rows))
    }

    fn delete<'a>(&'a self, numero_processo: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.delete_case(numero_processo))
    }
}
