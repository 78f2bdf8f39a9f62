use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// Where a configuration error was found; the gate reports a missing admin
/// secret as unavailable, everything else as an internal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Captcha,
    Admin,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    SecurityCheckFailed(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("too many requests")]
    RateLimited,
    #[error("{message}")]
    Configuration { scope: ConfigScope, message: String },
    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(scope: ConfigScope, message: impl Into<String>) -> Self {
        Self::Configuration {
            scope,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::SecurityCheckFailed(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Configuration {
                scope: ConfigScope::Admin,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration {
                scope: ConfigScope::Captcha,
                ..
            }
            | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Upstream(err) => {
                // Log the cause, return a generic message.
                error!("Internal error: {err:#}");
                "Internal server error".to_string()
            }
            Self::Configuration { message, .. } => {
                error!("Configuration error: {message}");
                "Service misconfigured".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
