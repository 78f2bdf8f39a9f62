use super::PgStore;
use crate::BoxFuture;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub id: Uuid,
    pub evento_tipo: String,
    pub evento_nome: String,
    pub usuario_id: Option<String>,
    pub pagina: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LabelCount {
    pub label: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AnalyticsSummary {
    pub total_consents: i64,
    pub total_events: i64,
    pub consents_by_campaign: Vec<LabelCount>,
    pub events_by_type: Vec<LabelCount>,
    pub top_events: Vec<LabelCount>,
    pub registrations_per_day: Vec<DailyCount>,
}

pub trait AnalyticsStore: Send + Sync {
    fn record_event<'a>(&'a self, event: &'a NewEvent) -> BoxFuture<'a, Result<()>>;

    /// Aggregates over everything created at or after `since`.
    fn summary(&self, since: DateTime<Utc>) -> BoxFuture<'_, Result<AnalyticsSummary>>;
}

const TOP_EVENTS: i64 = 20;

impl PgStore {
    async fn insert_event(&self, event: &NewEvent) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.table = "analytics_events"
        );
        sqlx::query(
            r"
            INSERT INTO analytics_events (id, evento_tipo, evento_nome, usuario_id, pagina, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(event.id)
        .bind(&event.evento_tipo)
        .bind(&event.evento_nome)
        .bind(event.usuario_id.as_deref())
        .bind(event.pagina.as_deref())
        .bind(event.metadata.as_ref())
        .execute(self.pool())
        .instrument(span)
        .await
        .context("Failed to insert analytics event")?;
        Ok(())
    }

    async fn labelled_counts(&self, query: &str, since: DateTime<Utc>) -> Result<Vec<LabelCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(query)
            .bind(since)
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .into_iter()
            .map(|(label, total)| LabelCount { label, total })
            .collect())
    }

    async fn build_summary(&self, since: DateTime<Utc>) -> Result<AnalyticsSummary> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.table = "analytics_events"
        );

        async {
            let (total_consents,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM consent_records WHERE created_at >= $1")
                    .bind(since)
                    .fetch_one(self.pool())
                    .await
                    .context("Failed to count consents")?;

            let (total_events,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM analytics_events WHERE created_at >= $1")
                    .bind(since)
                    .fetch_one(self.pool())
                    .await
                    .context("Failed to count events")?;

            let consents_by_campaign = self
                .labelled_counts(
                    r"
                    SELECT source_campaign, COUNT(*) FROM consent_records
                    WHERE created_at >= $1
                    GROUP BY source_campaign ORDER BY COUNT(*) DESC, source_campaign
                    ",
                    since,
                )
                .await
                .context("Failed to group consents by campaign")?;

            let events_by_type = self
                .labelled_counts(
                    r"
                    SELECT evento_tipo, COUNT(*) FROM analytics_events
                    WHERE created_at >= $1
                    GROUP BY evento_tipo ORDER BY COUNT(*) DESC, evento_tipo
                    ",
                    since,
                )
                .await
                .context("Failed to group events by type")?;

            let top_events: Vec<(String, i64)> = sqlx::query_as(
                r"
                SELECT evento_nome, COUNT(*) FROM analytics_events
                WHERE created_at >= $1
                GROUP BY evento_nome ORDER BY COUNT(*) DESC, evento_nome
                LIMIT $2
                ",
            )
            .bind(since)
            .bind(TOP_EVENTS)
            .fetch_all(self.pool())
            .await
            .context("Failed to rank events")?;

            let per_day: Vec<(NaiveDate, i64)> = sqlx::query_as(
                r"
                SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*)
                FROM consent_records
                WHERE created_at >= $1
                GROUP BY day ORDER BY day
                ",
            )
            .bind(since)
            .fetch_all(self.pool())
            .await
            .context("Failed to count registrations per day")?;

            Ok::<_, anyhow::Error>(AnalyticsSummary {
                total_consents,
                total_events,
                consents_by_campaign,
                events_by_type,
                top_events: top_events
                    .into_iter()
                    .map(|(label, total)| LabelCount { label, total })
                    .collect(),
                registrations_per_day: per_day
                    .into_iter()
                    .map(|(day, total)| DailyCount { day, total })
                    .collect(),
            })
        }
        .instrument(span)
        .await
    }
}

impl AnalyticsStore for PgStore {
    fn record_event<'a>(&'a self, event: &'a NewEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.insert_event(event))
    }

    fn summary(&self, since: DateTime<Utc>) -> BoxFuture<'_, Result<AnalyticsSummary>> {
        Box::pin(self.build_summary(since))
    }
}
