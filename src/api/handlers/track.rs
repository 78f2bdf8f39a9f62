//! Public analytics beacon.
//!
//! The event id is minted before the insert so the caller always gets an
//! answer; the insert itself runs in the background and may be lost.

use crate::{
    api::{error::ApiError, state::AppState},
    storage::NewEvent,
};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const NAME_MAX_CHARS: usize = 100;
const USER_ID_MAX_CHARS: usize = 100;
const PAGE_MAX_CHARS: usize = 2048;

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct TrackRequest {
    pub evento_tipo: String,
    pub evento_nome: String,
    pub usuario_id: Option<String>,
    pub pagina: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct TrackResponse {
    pub ok: bool,
    pub id: Uuid,
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > NAME_MAX_CHARS {
        return Err(ApiError::validation(format!("Invalid {field}")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>, max: usize, field: &str) -> Result<Option<String>, ApiError> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if value.chars().count() > max => {
            Err(ApiError::validation(format!("Invalid {field}")))
        }
        Some(value) if value.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Validate the beacon and assign it an id.
///
/// # Errors
/// `Validation` naming the offending field.
pub fn validate(request: TrackRequest) -> Result<NewEvent, ApiError> {
    Ok(NewEvent {
        id: Uuid::now_v7(),
        evento_tipo: required(&request.evento_tipo, "evento_tipo")?,
        evento_nome: required(&request.evento_nome, "evento_nome")?,
        usuario_id: optional(request.usuario_id, USER_ID_MAX_CHARS, "usuario_id")?,
        pagina: optional(request.pagina, PAGE_MAX_CHARS, "pagina")?,
        metadata: request.metadata.filter(|metadata| !metadata.is_null()),
    })
}

#[utoipa::path(
    post,
    path = "/track",
    request_body = TrackRequest,
    responses (
        (status = 200, description = "Event accepted", body = TrackResponse),
        (status = 400, description = "Missing or oversized field", body = crate::api::error::ErrorBody),
    ),
    tag = "analytics"
)]
#[instrument(skip(state, payload))]
pub async fn track(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<TrackRequest>>,
) -> Result<Json<TrackResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("Missing payload"));
    };
    let event = validate(request)?;
    let id = event.id;
    debug!(%id, evento_tipo = %event.evento_tipo, "event accepted");

    let task_state = state.clone();
    state.background().dispatch("track.insert", async move {
        task_state.stores().analytics.record_event(&event).await
    });

    Ok(Json(TrackResponse { ok: true, id }))
}
