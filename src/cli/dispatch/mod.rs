//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{self, admin, captcha, limits};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let allowed_origins = commands::allowed_origins(matches);
    if allowed_origins.is_empty() {
        anyhow::bail!(
            "missing required argument: --{}",
            commands::ARG_ALLOWED_ORIGINS
        );
    }

    let captcha_opts = captcha::Options::parse(matches)?;
    let admin_opts = admin::Options::parse(matches)?;
    let limit_opts = limits::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        allowed_origins,
        hcaptcha_secret: captcha_opts.secret,
        hcaptcha_verify_url: captcha_opts.verify_url,
        admin_secret: admin_opts.secret,
        limits: limit_opts,
    }))
}
