use crate::api::handlers::admin::is_cookie_safe;
use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_SECRET: &str = "admin-secret";

#[derive(Debug)]
pub struct Options {
    pub secret: Option<SecretString>,
}

impl Options {
    /// # Errors
    /// Returns an error if the secret cannot be stored verbatim in the login cookie.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_ADMIN_SECRET)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        if let Some(secret) = secret {
            if !is_cookie_safe(secret) {
                anyhow::bail!(
                    "invalid --{ARG_ADMIN_SECRET}: use printable ASCII without spaces, quotes, commas, semicolons or backslashes"
                );
            }
        }
        Ok(Self {
            secret: secret.map(|v| SecretString::from(v.to_string())),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ADMIN_SECRET)
            .long(ARG_ADMIN_SECRET)
            .help("Shared secret for the admin routes")
            .long_help(
                "Shared secret for the admin routes, presented as a bearer token or the admin_token cookie.\n\nWithout it the admin routes answer 503.",
            )
            .env("LEXCAPTURE_ADMIN_SECRET")
            .hide_env_values(true),
    )
}
