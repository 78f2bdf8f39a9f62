use crate::{
    api::{error::ApiError, state::AppState},
    storage::AuditRecord,
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Entries to return (default 100, max 500)
    pub limit: Option<i64>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 500;

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[utoipa::path(
    get,
    path = "/admin/audit",
    operation_id = "list_audit",
    params(AuditQuery),
    responses (
        (status = 200, description = "Audit entries, newest first", body = [AuditRecord]),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    Ok(Json(state.stores().audit.list(query.limit()).await?))
}
