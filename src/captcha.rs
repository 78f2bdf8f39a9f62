//! Server-side hCaptcha verification.
//!
//! The token produced by the widget is posted to the provider's `siteverify`
//! endpoint together with the site secret. A missing secret is an operator
//! error and is reported separately from a failed verification.

use crate::BoxFuture;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_VERIFY_URL: &str = "https://api.hcaptcha.com/siteverify";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    Verified,
    Rejected { error_codes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptchaError {
    #[error("captcha secret is not configured")]
    NotConfigured,
    #[error("captcha verification request failed: {0}")]
    Upstream(String),
}

pub trait CaptchaVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        token: &'a str,
        remote_ip: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CaptchaOutcome, CaptchaError>>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

pub struct HCaptchaVerifier {
    client: Client,
    secret: Option<SecretString>,
    verify_url: String,
}

impl HCaptchaVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret: Option<SecretString>, verify_url: String) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            secret,
            verify_url,
        })
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.secret
            .as_ref()
            .is_some_and(|secret| !secret.expose_secret().is_empty())
    }

    async fn siteverify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        let secret = match &self.secret {
            Some(secret) if !secret.expose_secret().is_empty() => secret,
            _ => return Err(CaptchaError::NotConfigured),
        };

        let mut form = vec![
            ("secret", secret.expose_secret()),
            ("response", token),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let span = info_span!("captcha.verify", http.method = "POST", url = %self.verify_url);
        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .instrument(span)
            .await
            .map_err(|err| CaptchaError::Upstream(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Upstream(format!("siteverify returned {status}")));
        }

        let body: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|err| CaptchaError::Upstream(err.to_string()))?;

        debug!(success = body.success, "captcha siteverify response");

        if body.success {
            Ok(CaptchaOutcome::Verified)
        } else {
            Ok(CaptchaOutcome::Rejected {
                error_codes: body.error_codes,
            })
        }
    }
}

impl std::fmt::Debug for HCaptchaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HCaptchaVerifier")
            .field("verify_url", &self.verify_url)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl CaptchaVerifier for HCaptchaVerifier {
    fn verify<'a>(
        &'a self,
        token: &'a str,
        remote_ip: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CaptchaOutcome, CaptchaError>> {
        Box::pin(self.siteverify(token, remote_ip))
    }
}
