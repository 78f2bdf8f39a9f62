use crate::{
    api::state::AppConfig,
    rate_limit::{RateLimitPolicy, MAX_WINDOW},
};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_REGISTER_IP_LIMIT: &str = "register-ip-limit";
pub const ARG_REGISTER_EMAIL_LIMIT: &str = "register-email-limit";
pub const ARG_REGISTER_WINDOW_SECONDS: &str = "register-window-seconds";
pub const ARG_ADMIN_LOGIN_LIMIT: &str = "admin-login-limit";
pub const ARG_ADMIN_LOGIN_WINDOW_SECONDS: &str = "admin-login-window-seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub register_ip_limit: u32,
    pub register_email_limit: u32,
    pub register_window_seconds: u64,
    pub admin_login_limit: u32,
    pub admin_login_window_seconds: u64,
}

impl Options {
    /// Parse rate limit arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let limit = |id: &str| {
            matches
                .get_one::<u32>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let seconds = |id: &str| {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            register_ip_limit: limit(ARG_REGISTER_IP_LIMIT)?,
            register_email_limit: limit(ARG_REGISTER_EMAIL_LIMIT)?,
            register_window_seconds: seconds(ARG_REGISTER_WINDOW_SECONDS)?,
            admin_login_limit: limit(ARG_ADMIN_LOGIN_LIMIT)?,
            admin_login_window_seconds: seconds(ARG_ADMIN_LOGIN_WINDOW_SECONDS)?,
        })
    }

    #[must_use]
    pub fn app_config(&self) -> AppConfig {
        let register_window = Duration::from_secs(self.register_window_seconds);
        AppConfig::new()
            .with_register_ip_policy(RateLimitPolicy::new(self.register_ip_limit, register_window))
            .with_register_email_policy(RateLimitPolicy::new(
                self.register_email_limit,
                register_window,
            ))
            .with_admin_login_policy(RateLimitPolicy::new(
                self.admin_login_limit,
                Duration::from_secs(self.admin_login_window_seconds),
            ))
    }
}

fn count_arg(id: &'static str, help: &'static str, default: &'static str, env: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .default_value(default)
        .env(env)
        .value_parser(clap::value_parser!(u32).range(1..))
}

fn seconds_arg(id: &'static str, help: &'static str, default: &'static str, env: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .default_value(default)
        .env(env)
        .value_parser(clap::value_parser!(u64).range(1..=MAX_WINDOW.as_secs()))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(count_arg(
            ARG_REGISTER_IP_LIMIT,
            "Registrations allowed per client IP per window",
            "5",
            "LEXCAPTURE_REGISTER_IP_LIMIT",
        ))
        .arg(count_arg(
            ARG_REGISTER_EMAIL_LIMIT,
            "Registrations allowed per email per window",
            "3",
            "LEXCAPTURE_REGISTER_EMAIL_LIMIT",
        ))
        .arg(seconds_arg(
            ARG_REGISTER_WINDOW_SECONDS,
            "Registration rate limit window in seconds",
            "3600",
            "LEXCAPTURE_REGISTER_WINDOW_SECONDS",
        ))
        .arg(count_arg(
            ARG_ADMIN_LOGIN_LIMIT,
            "Admin authentication attempts allowed per client IP per window",
            "5",
            "LEXCAPTURE_ADMIN_LOGIN_LIMIT",
        ))
        .arg(seconds_arg(
            ARG_ADMIN_LOGIN_WINDOW_SECONDS,
            "Admin authentication rate limit window in seconds",
            "900",
            "LEXCAPTURE_ADMIN_LOGIN_WINDOW_SECONDS",
        ))
}
