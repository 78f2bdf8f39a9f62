use crate::api::{error::ApiError, state::AppState};
use axum::{extract::Extension, Json};
use std::{collections::BTreeMap, sync::Arc};
use tracing::instrument;

#[utoipa::path(
    get,
    path = "/content",
    responses (
        (status = 200, description = "Site copy as a key/value map", body = BTreeMap<String, String>),
        (status = 500, description = "Storage failure", body = crate::api::error::ErrorBody),
    ),
    tag = "content"
)]
#[instrument(skip(state))]
pub async fn content(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let entries = state.stores().content.list().await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect(),
    ))
}
