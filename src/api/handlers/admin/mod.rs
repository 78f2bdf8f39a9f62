//! Back-office endpoints.
//!
//! Everything except login/logout sits behind [`require_admin`]; mutations
//! append their own audit entry on top of the gate's.

pub mod analytics;
pub mod audit;
pub mod cases;
pub mod consents;
pub mod content;
mod gate;
pub mod login;

pub use gate::{
    authorize, is_cookie_safe, presented_credential, require_admin, AdminContext,
    CredentialChecker, SharedSecretChecker, ADMIN_COOKIE,
};

use crate::{api::state::AppState, storage::AuditEntry};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tracing::warn;

/// Admin routes, mounted under `/admin`.
pub fn router() -> Router {
    let protected = Router::new()
        .route("/content", get(content::list))
        .route("/content/:key", put(content::upsert).delete(content::remove))
        .route("/consents", get(consents::list))
        .route("/consents/export", get(consents::export))
        .route("/cases", get(cases::list))
        .route("/cases/batch", post(cases::batch))
        .route("/cases/:numero", put(cases::update).delete(cases::remove))
        .route("/audit", get(audit::list))
        .route("/analytics", get(analytics::summary))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(login::logout))
        .merge(protected)
}

/// Append to the audit log; failures are logged and swallowed.
pub(crate) async fn record_audit(state: &AppState, entry: &AuditEntry) {
    if let Err(err) = state.stores().audit.append(entry).await {
        warn!(
            action = %entry.action,
            error = %format!("{err:#}"),
            "failed to append audit entry"
        );
    }
}
