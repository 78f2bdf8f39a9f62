//! Cookie login for the back-office UI.
//!
//! Login runs the same gate as every admin route, with the password in the
//! body instead of a header. On success the shared secret is stored in an
//! `HttpOnly` cookie so the browser never has to keep it in script.

use super::{authorize, AdminContext, ADMIN_COOKIE};
use crate::api::{
    error::{ApiError, ConfigScope},
    state::AppState,
};
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

/// Session lifetime in seconds (8 hours).
const SESSION_MAX_AGE: u64 = 8 * 60 * 60;

#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest").finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct LoginResponse {
    pub ok: bool,
}

fn session_cookie(value: &str, max_age: u64) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{ADMIN_COOKIE}={value}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age}"
    ))
    .map_err(|_| {
        ApiError::configuration(ConfigScope::Admin, "admin secret cannot be stored in a cookie")
    })
}

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Session cookie set", body = LoginResponse),
        (status = 401, description = "Wrong password", body = crate::api::error::ErrorBody),
        (status = 429, description = "Too many attempts from this IP", body = crate::api::error::ErrorBody),
        (status = 503, description = "Admin secret not configured", body = crate::api::error::ErrorBody),
    ),
    tag = "admin"
)]
#[instrument(skip(state, headers, payload))]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    let password = payload
        .map(|Json(request)| request.password)
        .filter(|password| !password.is_empty());
    let context = AdminContext::from_headers(&headers);

    authorize(&state, &context, password.as_deref(), "admin.login").await?;

    let cookie = session_cookie(password.as_deref().unwrap_or_default(), SESSION_MAX_AGE)?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse { ok: true }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses (
        (status = 200, description = "Session cookie cleared", body = LoginResponse),
    ),
    tag = "admin"
)]
pub async fn logout() -> Response {
    (
        [(
            SET_COOKIE,
            HeaderValue::from_static(
                "admin_token=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
            ),
        )],
        Json(LoginResponse { ok: true }),
    )
        .into_response()
}
