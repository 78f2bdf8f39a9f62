//! Lawsuit records maintained by the back office.

use super::{record_audit, AdminContext};
use crate::{
    api::{
        error::ApiError,
        handlers::utils::{normalize_email, valid_email, Pagination},
        state::AppState,
    },
    storage::{AuditOutcome, CaseRecord, CaseUpdate, CaseUpsert},
};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

pub const MAX_BATCH_ROWS: usize = 500;

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct CaseBatch {
    pub rows: Vec<CaseUpsert>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CaseBatchResponse {
    pub ok: bool,
    pub upserted: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clean_email(email: Option<String>) -> Result<Option<String>, ApiError> {
    match non_empty(email) {
        Some(email) => {
            let email = normalize_email(&email);
            if valid_email(&email) {
                Ok(Some(email))
            } else {
                Err(ApiError::validation("Invalid email"))
            }
        }
        None => Ok(None),
    }
}

/// Trim every row and reject the batch on the first bad one.
///
/// # Errors
/// `Validation` when the batch is empty, too large, or a row misses its
/// number or defendant.
pub fn validate_batch(rows: Vec<CaseUpsert>) -> Result<Vec<CaseUpsert>, ApiError> {
    if rows.is_empty() {
        return Err(ApiError::validation("Batch is empty"));
    }
    if rows.len() > MAX_BATCH_ROWS {
        return Err(ApiError::validation(format!(
            "Batch exceeds {MAX_BATCH_ROWS} rows"
        )));
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let numero_processo = row.numero_processo.trim().to_string();
            let reu = row.reu.trim().to_string();
            if numero_processo.is_empty() || reu.is_empty() {
                return Err(ApiError::validation(format!(
                    "Row {}: numero_processo and reu are required",
                    index + 1
                )));
            }
            Ok(CaseUpsert {
                numero_processo,
                reu,
                nome: non_empty(row.nome),
                email: clean_email(row.email)?,
            })
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/admin/cases",
    operation_id = "list_cases",
    params(Pagination),
    responses (
        (status = 200, description = "Case records ordered by number", body = [CaseRecord]),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CaseRecord>>, ApiError> {
    let cases = state.stores().cases.list(page.limit(), page.offset()).await?;
    Ok(Json(cases))
}

#[utoipa::path(
    put,
    path = "/admin/cases/{numero}",
    operation_id = "update_case",
    params(("numero" = String, Path, description = "Case number")),
    request_body = CaseUpdate,
    responses (
        (status = 200, description = "Case updated", body = CaseRecord),
        (status = 400, description = "Nothing to update or invalid field", body = crate::api::error::ErrorBody),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
        (status = 404, description = "No case with this number", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin, payload))]
pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Path(numero): Path<String>,
    payload: Option<Json<CaseUpdate>>,
) -> Result<Json<CaseRecord>, ApiError> {
    let Some(Json(update)) = payload else {
        return Err(ApiError::validation("Missing payload"));
    };
    let update = CaseUpdate {
        reu: non_empty(update.reu),
        nome: non_empty(update.nome),
        email: clean_email(update.email)?,
    };
    if update.is_empty() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let Some(case) = state.stores().cases.update(&numero, &update).await? else {
        return Err(ApiError::NotFound("Case not found".to_string()));
    };
    info!(numero_processo = %case.numero_processo, "case updated");
    record_audit(
        &state,
        &admin
            .audit("cases.update", AuditOutcome::Success)
            .with_details(json!({ "numero_processo": case.numero_processo })),
    )
    .await;

    Ok(Json(case))
}

#[utoipa::path(
    post,
    path = "/admin/cases/batch",
    operation_id = "import_cases",
    request_body = CaseBatch,
    responses (
        (status = 200, description = "Rows inserted or replaced", body = CaseBatchResponse),
        (status = 400, description = "Empty, oversized or malformed batch", body = crate::api::error::ErrorBody),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin, payload))]
pub async fn batch(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    payload: Option<Json<CaseBatch>>,
) -> Result<Json<CaseBatchResponse>, ApiError> {
    let Some(Json(CaseBatch { rows })) = payload else {
        return Err(ApiError::validation("Missing payload"));
    };
    let rows = validate_batch(rows)?;
    let received = rows.len();

    let upserted = state.stores().cases.upsert_batch(&rows).await?;
    info!(received, upserted, "case batch imported");
    record_audit(
        &state,
        &admin
            .audit("cases.batch", AuditOutcome::Success)
            .with_details(json!({ "received": received, "upserted": upserted })),
    )
    .await;

    Ok(Json(CaseBatchResponse { ok: true, upserted }))
}

#[utoipa::path(
    delete,
    path = "/admin/cases/{numero}",
    operation_id = "delete_case",
    params(("numero" = String, Path, description = "Case number")),
    responses (
        (status = 204, description = "Case deleted"),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
        (status = 404, description = "No case with this number", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin))]
pub async fn remove(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Path(numero): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.stores().cases.delete(&numero).await? {
        return Err(ApiError::NotFound("Case not found".to_string()));
    }
    info!(numero_processo = %numero, "case deleted");
    record_audit(
        &state,
        &admin
            .audit("cases.delete", AuditOutcome::Success)
            .with_details(json!({ "numero_processo": numero })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
