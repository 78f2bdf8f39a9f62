use super::{record_audit, AdminContext};
use crate::{
    api::{error::ApiError, state::AppState},
    storage::{AuditOutcome, ContentEntry},
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

const KEY_MAX_CHARS: usize = 100;
const VALUE_MAX_CHARS: usize = 10_000;

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ContentValue {
    pub value: String,
}

/// Keys are `[A-Za-z0-9_.-]`, 1 to 100 characters.
pub fn valid_key(key: &str) -> bool {
    (1..=KEY_MAX_CHARS).contains(&key.len())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[utoipa::path(
    get,
    path = "/admin/content",
    operation_id = "list_content",
    responses (
        (status = 200, description = "Every content entry, ordered by key", body = [ContentEntry]),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state))]
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<ContentEntry>>, ApiError> {
    Ok(Json(state.stores().content.list().await?))
}

#[utoipa::path(
    put,
    path = "/admin/content/{key}",
    operation_id = "upsert_content",
    params(("key" = String, Path, description = "Content key")),
    request_body = ContentValue,
    responses (
        (status = 200, description = "Entry stored", body = ContentEntry),
        (status = 400, description = "Invalid key or value", body = crate::api::error::ErrorBody),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin, payload))]
pub async fn upsert(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Path(key): Path<String>,
    payload: Option<Json<ContentValue>>,
) -> Result<Json<ContentEntry>, ApiError> {
    if !valid_key(&key) {
        return Err(ApiError::validation("Invalid content key"));
    }
    let Some(Json(ContentValue { value })) = payload else {
        return Err(ApiError::validation("Missing payload"));
    };
    if value.chars().count() > VALUE_MAX_CHARS {
        return Err(ApiError::validation("Content value too long"));
    }

    let entry = state.stores().content.upsert(&key, &value).await?;
    info!(key = %entry.key, "content entry stored");
    record_audit(
        &state,
        &admin
            .audit("content.upsert", AuditOutcome::Success)
            .with_details(json!({ "key": entry.key })),
    )
    .await;

    Ok(Json(entry))
}

#[utoipa::path(
    delete,
    path = "/admin/content/{key}",
    operation_id = "delete_content",
    params(("key" = String, Path, description = "Content key")),
    responses (
        (status = 204, description = "Entry deleted"),
        (status = 401, description = "Missing or wrong admin credential", body = crate::api::error::ErrorBody),
        (status = 404, description = "No entry with this key", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, admin))]
pub async fn remove(
    Extension(state): Extension<Arc<AppState>>,
    Extension(admin): Extension<AdminContext>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.stores().content.delete(&key).await? {
        return Err(ApiError::NotFound("Content entry not found".to_string()));
    }
    info!(%key, "content entry deleted");
    record_audit(
        &state,
        &admin
            .audit("content.delete", AuditOutcome::Success)
            .with_details(json!({ "key": key })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
