use crate::{
    api::{error::ApiError, state::AppState},
    storage::AnalyticsSummary,
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsQuery {
    /// Look-back window in days (default 30, 1 to 365)
    pub days: Option<i64>,
}

impl AnalyticsQuery {
    /// # Errors
    /// `Validation` when `days` is outside 1..=365.
    pub fn days(&self) -> Result<i64, ApiError> {
        match self.days {
            None => Ok(DEFAULT_DAYS),
            Some(days) if (1..=MAX_DAYS).contains(&days) => Ok(days),
            Some(_) => Err(ApiError::validation(format!(
                "days must be between 1 and {MAX_DAYS}"
            ))),
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/analytics",
    operation_id = "analytics_summary",
    params(AnalyticsQuery),
    responses (
        (status = 200, description = "Totals and breakdowns for the window", body = AnalyticsSummary),
        (status = 400, description = "Window out of range", body = crate::api::error::ErrorBody),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn summary(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    let since = Utc::now() - Duration::days(query.days()?);
    Ok(Json(state.stores().analytics.summary(since).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::TestContext;
    use crate::storage::NewConsent;

    #[test]
    fn days_bounds() {
        assert!(matches!(AnalyticsQuery::default().days(), Ok(30)));
        assert!(matches!(AnalyticsQuery { days: Some(365) }.days(), Ok(365)));
        assert!(AnalyticsQuery { days: Some(0) }.days().is_err());
        assert!(AnalyticsQuery { days: Some(366) }.days().is_err());
    }

    #[tokio::test]
    async fn summary_counts_consents_by_campaign() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        for campaign in ["instagram", "instagram", "direct"] {
            ctx.state
                .stores()
                .consents
                .insert(&NewConsent {
                    cpf: String::new(),
                    name: "Ana".to_string(),
                    email: "ana@example.com".to_string(),
                    phone: "11987654321".to_string(),
                    terms_version: "v1".to_string(),
                    terms_hash: "abc".to_string(),
                    ip: "203.0.113.7".to_string(),
                    user_agent: String::new(),
                    source_campaign: campaign.to_string(),
                })
                .await?;
        }

        let Json(summary) = summary(
            Extension(ctx.state.clone()),
            Query(AnalyticsQuery::default()),
        )
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(summary.total_consents, 3);
        let instagram = summary
            .consents_by_campaign
            .iter()
            .find(|count| count.label == "instagram")
            .map(|count| count.total);
        assert_eq!(instagram, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_window_is_rejected() {
        let ctx = TestContext::new();
        let result = summary(
            Extension(ctx.state.clone()),
            Query(AnalyticsQuery { days: Some(400) }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
