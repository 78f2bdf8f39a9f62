use crate::{
    api::{self, ServerSettings},
    cli::{commands::limits, telemetry},
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub allowed_origins: Vec<String>,
    pub hcaptcha_secret: Option<SecretString>,
    pub hcaptcha_verify_url: String,
    pub admin_secret: Option<SecretString>,
    pub limits: limits::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let settings = ServerSettings {
        allowed_origins: args.allowed_origins,
        config: args.limits.app_config(),
        hcaptcha_secret: args.hcaptcha_secret,
        hcaptcha_verify_url: args.hcaptcha_verify_url,
        admin_secret: args.admin_secret,
    };

    let result = api::new(args.port, args.dsn, settings).await;
    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("allowed_origins", args.allowed_origins.join(",")),
        ("hcaptcha_secret_set", args.hcaptcha_secret.is_some().to_string()),
        ("hcaptcha_verify_url", args.hcaptcha_verify_url.clone()),
        ("admin_secret_set", args.admin_secret.is_some().to_string()),
        (
            "register_limits",
            format!(
                "ip={} email={} window={}s",
                args.limits.register_ip_limit,
                args.limits.register_email_limit,
                args.limits.register_window_seconds
            ),
        ),
        (
            "admin_login_limit",
            format!(
                "{} per {}s",
                args.limits.admin_login_limit, args.limits.admin_login_window_seconds
            ),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "lexcapture {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
