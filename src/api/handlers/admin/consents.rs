use super::{record_audit, AdminContext};
use crate::{
    api::{
        error::ApiError,
        handlers::utils::{csv_field, Pagination},
        state::AppState,
    },
    storage::{AuditOutcome, ConsentRecord},
};
use axum::{
    extract::{Extension, Query},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

const CSV_HEADER: &str = "id,created_at,name,email,phone,cpf,accepted_terms,terms_version,terms_hash,ip,user_agent,source_campaign";
const CSV_FILENAME: &str = "consents.csv";

#[utoipa::path(
    get,
    path = "/admin/consents",
    operation_id = "list_consents",
    params(Pagination),
    responses (
        (status = 200, description = "Consent records, newest first", body = [ConsentRecord]),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ConsentRecord>>, ApiError> {
    let records = state
        .stores()
        .consents
        .list(page.limit(), page.offset())
        .await?;
    Ok(Json(records))
}

/// Render consent records as CSV, oldest first, one header line.
pub fn to_csv(records: &[ConsentRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + records.len() * 160);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for record in records {
        let row = [
            record.id.to_string(),
            record.created_at.to_rfc3339(),
            csv_field(&record.name),
            csv_field(&record.email),
            csv_field(&record.phone),
            csv_field(&record.cpf),
            record.accepted_terms.to_string(),
            csv_field(&record.terms_version),
            csv_field(&record.terms_hash),
            csv_field(&record.ip),
            csv_field(&record.user_agent),
            csv_field(&record.source_campaign),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

#[utoipa::path(
    get,
    path = "/admin/consents/export",
    operation_id = "export_consents",
    responses (
        (status = 200, description = "Every consent record as CSV", content_type = "text/csv", body = String),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin))]
pub async fn export(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
) -> Result<Response, ApiError> {
    let records = state.stores().consents.export().await?;
    info!(rows = records.len(), "consent export generated");
    record_audit(
        &state,
        &admin
            .audit("consents.export", AuditOutcome::Success)
            .with_details(json!({ "rows": records.len() })),
    )
    .await;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{CSV_FILENAME}\""),
            ),
        ],
        to_csv(&records),
    )
        .into_response())
}
