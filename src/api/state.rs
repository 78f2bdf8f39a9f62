use super::{background::BackgroundTasks, handlers::admin::CredentialChecker};
use crate::{
    captcha::CaptchaVerifier,
    rate_limit::{RateLimitPolicy, RateLimiter},
    storage::Stores,
};
use std::{sync::Arc, time::Duration};

const DEFAULT_REGISTER_IP_LIMIT: u32 = 5;
const DEFAULT_REGISTER_EMAIL_LIMIT: u32 = 3;
const DEFAULT_REGISTER_WINDOW_SECONDS: u64 = 60 * 60;
const DEFAULT_ADMIN_LOGIN_LIMIT: u32 = 5;
const DEFAULT_ADMIN_LOGIN_WINDOW_SECONDS: u64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    register_ip: RateLimitPolicy,
    register_email: RateLimitPolicy,
    admin_login: RateLimitPolicy,
}

impl AppConfig {
    #[must_use]
    pub fn new() -> Self {
        let register_window = Duration::from_secs(DEFAULT_REGISTER_WINDOW_SECONDS);
        Self {
            register_ip: RateLimitPolicy::new(DEFAULT_REGISTER_IP_LIMIT, register_window),
            register_email: RateLimitPolicy::new(DEFAULT_REGISTER_EMAIL_LIMIT, register_window),
            admin_login: RateLimitPolicy::new(
                DEFAULT_ADMIN_LOGIN_LIMIT,
                Duration::from_secs(DEFAULT_ADMIN_LOGIN_WINDOW_SECONDS),
            ),
        }
    }

    #[must_use]
    pub fn with_register_ip_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.register_ip = policy;
        self
    }

    #[must_use]
    pub fn with_register_email_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.register_email = policy;
        self
    }

    #[must_use]
    pub fn with_admin_login_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.admin_login = policy;
        self
    }

    #[must_use]
    pub fn register_ip_policy(&self) -> RateLimitPolicy {
        self.register_ip
    }

    #[must_use]
    pub fn register_email_policy(&self) -> RateLimitPolicy {
        self.register_email
    }

    #[must_use]
    pub fn admin_login_policy(&self) -> RateLimitPolicy {
        self.admin_login
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a handler needs, built once at start-up and shared via `Extension`.
pub struct AppState {
    config: AppConfig,
    stores: Stores,
    captcha: Arc<dyn CaptchaVerifier>,
    limiter: Arc<dyn RateLimiter>,
    credentials: Arc<dyn CredentialChecker>,
    background: BackgroundTasks,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        stores: Stores,
        captcha: Arc<dyn CaptchaVerifier>,
        limiter: Arc<dyn RateLimiter>,
        credentials: Arc<dyn CredentialChecker>,
    ) -> Self {
        Self {
            config,
            stores,
            captcha,
            limiter,
            credentials,
            background: BackgroundTasks::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub fn captcha(&self) -> &dyn CaptchaVerifier {
        self.captcha.as_ref()
    }

    #[must_use]
    pub fn limiter(&self) -> &dyn RateLimiter {
        self.limiter.as_ref()
    }

    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialChecker {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
