//! Shared-secret admin gate.
//!
//! Flow Overview:
//! 1) Refuse with 503 when no admin secret is configured.
//! 2) Compare the presented credential in constant time.
//! 3) A match only reads `admin_login:<ip>`: a blocked IP gets 429, otherwise
//!    the counter is reset. A mismatch is counted against the same key and
//!    answers 401, or 429 once the IP is blocked.
//!
//! Every counted attempt is appended to the audit log. Audit failures are
//! logged and never change the outcome.

use super::record_audit;
use crate::{
    api::{
        error::{ApiError, ConfigScope},
        handlers::utils::{
            constant_time_eq, extract_bearer_token, extract_client_ip, extract_cookie, user_agent,
        },
        state::AppState,
    },
    rate_limit::admin_login_key,
    storage::{AuditEntry, AuditOutcome},
};
use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub const ADMIN_COOKIE: &str = "admin_token";

/// Bucket used when the client IP cannot be determined.
const UNKNOWN_IP: &str = "unknown";

/// Whether `value` can travel verbatim as a cookie value: visible ASCII
/// except `"`, `,`, `;` and `\`.
#[must_use]
pub fn is_cookie_safe(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|byte| {
            matches!(byte, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
        })
}

pub trait CredentialChecker: Send + Sync {
    /// `false` when no credential could ever match.
    fn is_configured(&self) -> bool;

    fn verify(&self, presented: &str) -> bool;
}

pub struct SharedSecretChecker {
    secret: Option<SecretString>,
}

impl SharedSecretChecker {
    #[must_use]
    pub fn new(secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|secret| !secret.expose_secret().is_empty());
        Self { secret }
    }
}

impl CredentialChecker for SharedSecretChecker {
    fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn verify(&self, presented: &str) -> bool {
        self.secret.as_ref().is_some_and(|secret| {
            constant_time_eq(presented.as_bytes(), secret.expose_secret().as_bytes())
        })
    }
}

impl std::fmt::Debug for SharedSecretChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretChecker")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

/// Who passed the gate; handlers use it for their own audit entries.
#[derive(Clone, Debug, Default)]
pub struct AdminContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AdminContext {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip: extract_client_ip(headers),
            user_agent: user_agent(headers),
        }
    }

    #[must_use]
    pub fn audit(&self, action: &str, outcome: AuditOutcome) -> AuditEntry {
        AuditEntry::new(action, outcome)
            .with_ip(self.ip.clone())
            .with_user_agent(self.user_agent.clone())
    }
}

/// Bearer token first, then the admin cookie.
#[must_use]
pub fn presented_credential(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie(headers, ADMIN_COOKIE))
}

/// Run one gate attempt for `action`.
///
/// # Errors
/// `Configuration` (503) without a secret, `RateLimited` when the IP is
/// blocked, `Unauthorized` on a missing or wrong credential.
pub async fn authorize(
    state: &AppState,
    context: &AdminContext,
    presented: Option<&str>,
    action: &str,
) -> Result<(), ApiError> {
    let credentials = state.credentials();
    if !credentials.is_configured() {
        return Err(ApiError::configuration(
            ConfigScope::Admin,
            "admin secret is not configured",
        ));
    }

    let key = admin_login_key(context.ip.as_deref().unwrap_or(UNKNOWN_IP));
    let limiter = state.limiter();
    let policy = state.config().admin_login_policy();
    let verified = presented.is_some_and(|presented| credentials.verify(presented));

    // Only failed attempts spend the budget.
    let blocked = if verified {
        limiter.is_limited(&key, policy).await?
    } else {
        !limiter.check(&key, policy).await?.is_allowed()
    };

    if blocked {
        info!(action, "admin attempt blocked by rate limit");
        record_audit(
            state,
            &context
                .audit(action, AuditOutcome::Blocked)
                .with_details(json!({"reason": "rate_limited"})),
        )
        .await;
        return Err(ApiError::RateLimited);
    }

    if verified {
        if let Err(err) = limiter.reset(&key).await {
            warn!(error = %format!("{err:#}"), "failed to reset admin rate limit");
        }
        record_audit(state, &context.audit(action, AuditOutcome::Success)).await;
        Ok(())
    } else {
        let reason = if presented.is_some() {
            "invalid_credential"
        } else {
            "missing_credential"
        };
        info!(action, reason, "admin attempt rejected");
        record_audit(
            state,
            &context
                .audit(action, AuditOutcome::Failure)
                .with_details(json!({ "reason": reason })),
        )
        .await;
        Err(ApiError::Unauthorized)
    }
}

/// Middleware guarding every admin route.
pub async fn require_admin(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = AdminContext::from_headers(request.headers());
    let presented = presented_credential(request.headers());
    let action = format!("{} {}", request.method(), request.uri().path());

    match authorize(&state, &context, presented.as_deref(), &action).await {
        Ok(()) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
