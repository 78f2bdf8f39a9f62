//! Request helpers shared by public and admin handlers.

use axum::http::{
    header::{AUTHORIZATION, COOKIE, USER_AGENT},
    HeaderMap,
};
use regex::Regex;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use utoipa::IntoParams;

pub const DEFAULT_CAMPAIGN: &str = "direct";
const MAX_CAMPAIGN_LEN: usize = 50;
const MAX_USER_AGENT_LEN: usize = 512;

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Letters (any script), spaces, apostrophes, dots and hyphens.
pub fn valid_person_name(name: &str) -> bool {
    Regex::new(r"^[\p{L}\s'.\-]+$").is_ok_and(|regex| regex.is_match(name))
}

/// Extract a client IP for rate limiting from common proxy headers.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.chars().take(MAX_USER_AGENT_LEN).collect())
}

/// Keep `[A-Za-z0-9_-]`; anything empty or too long becomes the default tag.
pub fn sanitize_campaign(campaign: Option<&str>) -> String {
    let cleaned: String = campaign
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned.len() > MAX_CAMPAIGN_LEN {
        DEFAULT_CAMPAIGN.to_string()
    } else {
        cleaned
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == name && !val.trim().is_empty()).then(|| val.trim().to_string())
    })
}

/// Constant-time byte comparison; only the length is leaked.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Quote a CSV field when it holds a separator, quote or line break.
///
/// Leading `=`, `+`, `-` and `@` are prefixed with `'` so spreadsheets do not
/// evaluate the cell as a formula.
pub fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Page size (default 50, max 200)
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
