//! Public lead registration.
//!
//! Flow Overview:
//! 1) Validate the payload (no limiter is touched on failure).
//! 2) Verify the hCaptcha token server-side.
//! 3) Resolve the client IP and apply the per-IP then per-email limits.
//! 4) Look up a lawsuit record by email (best effort).
//! 5) Store the consent record pinned to the current terms hash.
//! 6) Link the consent to the case (best effort) and answer with its number.

use super::utils::{
    extract_client_ip, normalize_email, sanitize_campaign, user_agent, valid_email,
    valid_person_name,
};
use crate::{
    api::{error::ApiError, error::ConfigScope, state::AppState},
    captcha::{CaptchaError, CaptchaOutcome},
    cpf,
    rate_limit::{email_key, ip_key},
    storage::{CaseRecord, NewConsent},
    terms,
};
use anyhow::anyhow;
use axum::{extract::Extension, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

/// Case number returned when no lawsuit record matches the submitter.
pub const CASE_NOT_FOUND: &str = "nao-encontrado";

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 100;
const EMAIL_MAX_CHARS: usize = 254;
const PHONE_MAX_CHARS: usize = 20;
const CAPTCHA_TOKEN_MAX_CHARS: usize = 4096;

#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub nome: String,
    pub email: String,
    pub telefone: String,
    #[serde(rename = "hcaptchaToken")]
    pub hcaptcha_token: String,
    pub campaign: Option<String>,
    pub cpf: Option<String>,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("campaign", &self.campaign)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RegisterResponse {
    pub ok: bool,
    pub numero_processo: String,
}

/// A payload that passed every format check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub cpf: String,
    pub campaign: String,
    pub captcha_token: String,
}

/// Check every field and normalize the ones that are stored.
///
/// # Errors
/// Returns `ApiError::Validation` naming the first invalid field.
pub fn validate(request: &RegisterRequest) -> Result<ValidRegistration, ApiError> {
    let name = request.nome.trim();
    let name_len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) || !valid_person_name(name) {
        return Err(ApiError::validation("Invalid name"));
    }

    let email = normalize_email(&request.email);
    if email.chars().count() > EMAIL_MAX_CHARS || !valid_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }

    let phone = cpf::normalize(&request.telefone);
    if request.telefone.chars().count() > PHONE_MAX_CHARS || !(10..=11).contains(&phone.len()) {
        return Err(ApiError::validation("Invalid phone"));
    }

    let captcha_token = request.hcaptcha_token.trim();
    if captcha_token.is_empty() || captcha_token.chars().count() > CAPTCHA_TOKEN_MAX_CHARS {
        return Err(ApiError::validation("Missing or invalid captcha token"));
    }

    let cpf = match request.cpf.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            if !cpf::is_valid_cpf(raw) {
                return Err(ApiError::validation("Invalid CPF"));
            }
            cpf::normalize(raw)
        }
        _ => String::new(),
    };

    Ok(ValidRegistration {
        name: name.to_string(),
        email,
        phone,
        cpf,
        campaign: sanitize_campaign(request.campaign.as_deref()),
        captcha_token: captcha_token.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses (
        (status = 200, description = "Consent recorded", body = RegisterResponse),
        (status = 400, description = "Invalid payload, failed captcha or unknown origin", body = crate::api::error::ErrorBody),
        (status = 429, description = "Too many registrations from this IP or email", body = crate::api::error::ErrorBody),
        (status = 500, description = "Captcha not configured or storage failure", body = crate::api::error::ErrorBody),
    ),
    tag = "leads"
)]
#[instrument(skip(state, headers, payload))]
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("Missing payload"));
    };

    let lead = validate(&request)?;
    let client_ip = extract_client_ip(&headers);

    match state
        .captcha()
        .verify(&lead.captcha_token, client_ip.as_deref())
        .await
    {
        Ok(CaptchaOutcome::Verified) => debug!("captcha verified"),
        Ok(CaptchaOutcome::Rejected { error_codes }) => {
            debug!(?error_codes, "captcha rejected");
            return Err(ApiError::SecurityCheckFailed(
                "Captcha verification failed".to_string(),
            ));
        }
        Err(CaptchaError::NotConfigured) => {
            return Err(ApiError::configuration(
                ConfigScope::Captcha,
                "hCaptcha secret is not configured",
            ));
        }
        Err(CaptchaError::Upstream(reason)) => {
            return Err(ApiError::Upstream(anyhow!(
                "captcha verification failed: {reason}"
            )));
        }
    }

    let Some(client_ip) = client_ip else {
        return Err(ApiError::validation("Could not identify request origin"));
    };

    let config = state.config();
    let limiter = state.limiter();
    if !limiter
        .check(&ip_key(&client_ip), config.register_ip_policy())
        .await?
        .is_allowed()
    {
        info!("registration rate limited by ip");
        return Err(ApiError::RateLimited);
    }
    if !limiter
        .check(&email_key(&lead.email), config.register_email_policy())
        .await?
        .is_allowed()
    {
        info!("registration rate limited by email");
        return Err(ApiError::RateLimited);
    }

    let stores = state.stores();
    let case: Option<CaseRecord> = match stores.cases.find_by_email(&lead.email).await {
        Ok(case) => case,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "case lookup failed; continuing without a case");
            None
        }
    };

    let consent = NewConsent {
        cpf: lead.cpf,
        name: lead.name,
        email: lead.email,
        phone: lead.phone,
        terms_version: terms::TERMS_VERSION.to_string(),
        terms_hash: terms::terms_hash().to_string(),
        ip: client_ip,
        user_agent: user_agent(&headers).unwrap_or_default(),
        source_campaign: lead.campaign,
    };
    let consent_id = stores.consents.insert(&consent).await?;

    let numero_processo = match case {
        Some(case) => {
            if let Err(err) = stores.cases.link_consent(case.id, consent_id).await {
                warn!(error = %format!("{err:#}"), case_id = %case.id, "failed to link consent to case");
            }
            case.numero_processo
        }
        None => CASE_NOT_FOUND.to_string(),
    };

    info!(%consent_id, campaign = %consent.source_campaign, "consent recorded");

    Ok(Json(RegisterResponse {
        ok: true,
        numero_processo,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{TestContext, CLIENT_IP};
    use crate::rate_limit::RateLimitPolicy;
    use axum::http::{HeaderValue, StatusCode};
    use std::time::Duration;

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            nome: "Maria da Silva".to_string(),
            email: email.to_string(),
            telefone: "(11) 98765-4321".to_string(),
            hcaptcha_token: "10000000-aaaa-bbbb-cccc-000000000001".to_string(),
            campaign: Some("instagram".to_string()),
            cpf: Some("529.982.247-25".to_string()),
        }
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(CLIENT_IP));
        headers.insert("user-agent", HeaderValue::from_static("test-agent"));
        headers
    }

    async fn submit(
        ctx: &TestContext,
        headers: HeaderMap,
        request: RegisterRequest,
    ) -> Result<Json<RegisterResponse>, ApiError> {
        register(Extension(ctx.state.clone()), headers, Some(Json(request))).await
    }

    #[test]
    fn validate_normalizes_fields() -> anyhow::Result<()> {
        let mut req = request("  Maria@Example.COM ");
        req.campaign = Some("black friday!".to_string());
        let lead = validate(&req).map_err(|err| anyhow!("{err}"))?;
        assert_eq!(lead.email, "maria@example.com");
        assert_eq!(lead.phone, "11987654321");
        assert_eq!(lead.cpf, "52998224725");
        assert_eq!(lead.campaign, "blackfriday");
        Ok(())
    }

    fn expect_invalid(mutate: impl FnOnce(&mut RegisterRequest), expected: &str) {
        let mut req = request("maria@example.com");
        mutate(&mut req);
        match validate(&req) {
            Err(ApiError::Validation(message)) => assert_eq!(message, expected),
            other => panic!("expected validation error {expected}, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_each_field() {
        expect_invalid(|r| r.nome = "M".to_string(), "Invalid name");
        expect_invalid(|r| r.nome = "M".repeat(101), "Invalid name");
        expect_invalid(|r| r.nome = "Maria <b>".to_string(), "Invalid name");
        expect_invalid(|r| r.email = "maria.example.com".to_string(), "Invalid email");
        expect_invalid(
            |r| r.email = format!("{}@example.com", "a".repeat(250)),
            "Invalid email",
        );
        expect_invalid(|r| r.telefone = "12345".to_string(), "Invalid phone");
        expect_invalid(|r| r.telefone = "1".repeat(21), "Invalid phone");
        expect_invalid(
            |r| r.hcaptcha_token = String::new(),
            "Missing or invalid captcha token",
        );
        expect_invalid(
            |r| r.hcaptcha_token = "x".repeat(4097),
            "Missing or invalid captcha token",
        );
        expect_invalid(|r| r.cpf = Some("111.111.111-11".to_string()), "Invalid CPF");
    }

    #[test]
    fn validate_accepts_missing_cpf_and_campaign() -> anyhow::Result<()> {
        let mut req = request("maria@example.com");
        req.cpf = Some("  ".to_string());
        req.campaign = None;
        let lead = validate(&req).map_err(|err| anyhow!("{err}"))?;
        assert_eq!(lead.cpf, "");
        assert_eq!(lead.campaign, "direct");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_before_any_limit() {
        let ctx = TestContext::new();
        let result = submit(&ctx, headers(), request("not-an-email")).await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert!(ctx.limiter.is_empty());
        assert_eq!(ctx.captcha.calls(), 0);
        assert!(ctx.store.consents().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_is_bad_request() {
        let ctx = TestContext::new();
        let result = register(Extension(ctx.state.clone()), headers(), None).await;
        assert!(matches!(result, Err(err) if err.status() == StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn matching_case_returns_its_number_and_links_consent() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        let case_id = ctx.store.add_case("0001234-56.2023.8.26.0100", "maria@example.com");

        let Json(response) = submit(&ctx, headers(), request("Maria@Example.com"))
            .await
            .map_err(|err| anyhow!("{err}"))?;

        assert_eq!(
            response,
            RegisterResponse {
                ok: true,
                numero_processo: "0001234-56.2023.8.26.0100".to_string(),
            }
        );

        let consents = ctx.store.consents();
        assert_eq!(consents.len(), 1);
        let consent = &consents[0];
        assert_eq!(consent.email, "maria@example.com");
        assert_eq!(consent.ip, CLIENT_IP);
        assert_eq!(consent.user_agent, "test-agent");
        assert_eq!(consent.source_campaign, "instagram");
        assert_eq!(consent.terms_version, terms::TERMS_VERSION);
        assert_eq!(consent.terms_hash, terms::terms_hash());
        assert_eq!(ctx.store.linked_consent(case_id), Some(consent.id));
        Ok(())
    }

    #[tokio::test]
    async fn no_case_returns_sentinel() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        let Json(response) = submit(&ctx, headers(), request("maria@example.com"))
            .await
            .map_err(|err| anyhow!("{err}"))?;
        assert_eq!(response.numero_processo, CASE_NOT_FOUND);
        assert_eq!(ctx.store.consents().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn case_lookup_failure_returns_sentinel() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        ctx.store.add_case("0001234-56.2023.8.26.0100", "maria@example.com");
        ctx.store.fail_case_lookup(true);

        let Json(response) = submit(&ctx, headers(), request("maria@example.com"))
            .await
            .map_err(|err| anyhow!("{err}"))?;
        assert!(response.ok);
        assert_eq!(response.numero_processo, CASE_NOT_FOUND);
        assert_eq!(ctx.store.consents().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn link_failure_still_returns_case_number() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        let case_id = ctx.store.add_case("42", "maria@example.com");
        ctx.store.fail_case_link(true);

        let Json(response) = submit(&ctx, headers(), request("maria@example.com"))
            .await
            .map_err(|err| anyhow!("{err}"))?;
        assert_eq!(response.numero_processo, "42");
        assert_eq!(ctx.store.linked_consent(case_id), None);
        Ok(())
    }

    #[tokio::test]
    async fn consent_write_failure_is_internal_error() {
        let ctx = TestContext::new();
        ctx.store.fail_consent_insert(true);
        let result = submit(&ctx, headers(), request("maria@example.com")).await;
        assert!(matches!(result, Err(err) if err.status() == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn captcha_rejection_is_bad_request() {
        let ctx = TestContext::new();
        ctx.captcha.set(Ok(CaptchaOutcome::Rejected {
            error_codes: vec!["invalid-input-response".to_string()],
        }));
        let result = submit(&ctx, headers(), request("maria@example.com")).await;
        assert!(matches!(result, Err(ApiError::SecurityCheckFailed(_))));
        assert!(ctx.limiter.is_empty());
    }

    #[tokio::test]
    async fn missing_captcha_secret_is_internal_error() {
        let ctx = TestContext::new();
        ctx.captcha.set(Err(CaptchaError::NotConfigured));
        let result = submit(&ctx, headers(), request("maria@example.com")).await;
        assert!(matches!(result, Err(err) if err.status() == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn captcha_upstream_error_is_internal_error() {
        let ctx = TestContext::new();
        ctx.captcha.set(Err(CaptchaError::Upstream("timeout".to_string())));
        let result = submit(&ctx, headers(), request("maria@example.com")).await;
        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[tokio::test]
    async fn unknown_origin_is_bad_request() {
        let ctx = TestContext::new();
        let result = submit(&ctx, HeaderMap::new(), request("maria@example.com")).await;
        match result {
            Err(ApiError::Validation(message)) => {
                assert_eq!(message, "Could not identify request origin");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(ctx.limiter.is_empty());
    }

    #[tokio::test]
    async fn ip_limit_applies_across_emails() -> anyhow::Result<()> {
        let ctx = TestContext::with_config(|config| {
            config.with_register_ip_policy(RateLimitPolicy::new(2, Duration::from_secs(3600)))
        });

        for n in 0..2 {
            submit(&ctx, headers(), request(&format!("lead{n}@example.com")))
                .await
                .map_err(|err| anyhow!("{err}"))?;
        }
        let result = submit(&ctx, headers(), request("lead9@example.com")).await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        // The denied request never reached the email limiter.
        assert_eq!(ctx.limiter.count("email:lead9@example.com"), None);
        Ok(())
    }

    #[tokio::test]
    async fn email_limit_applies_across_ips() -> anyhow::Result<()> {
        let ctx = TestContext::new();
        for n in 0..3 {
            let mut headers = HeaderMap::new();
            headers.insert("x-real-ip", HeaderValue::from_str(&format!("10.0.0.{n}"))?);
            submit(&ctx, headers, request("maria@example.com"))
                .await
                .map_err(|err| anyhow!("{err}"))?;
        }

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.99"));
        let result = submit(&ctx, headers, request("maria@example.com")).await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(ctx.store.consents().len(), 3);
        Ok(())
    }
}
