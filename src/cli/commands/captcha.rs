use crate::captcha::DEFAULT_VERIFY_URL;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_HCAPTCHA_SECRET: &str = "hcaptcha-secret";
pub const ARG_HCAPTCHA_VERIFY_URL: &str = "hcaptcha-verify-url";

#[derive(Debug)]
pub struct Options {
    pub secret: Option<SecretString>,
    pub verify_url: String,
}

impl Options {
    /// Parse hCaptcha arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the verify URL is not a valid URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Env vars set to "" reach clap as empty strings
        let secret = matches
            .get_one::<String>(ARG_HCAPTCHA_SECRET)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.trim().to_string()));

        let verify_url = matches
            .get_one::<String>(ARG_HCAPTCHA_VERIFY_URL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VERIFY_URL.to_string());
        url::Url::parse(&verify_url)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_HCAPTCHA_VERIFY_URL}: {e}"))?;

        Ok(Self { secret, verify_url })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HCAPTCHA_SECRET)
                .long(ARG_HCAPTCHA_SECRET)
                .help("hCaptcha secret used to verify registration tokens")
                .long_help(
                    "hCaptcha secret used to verify registration tokens server-side.\n\nWithout it every registration is refused with a configuration error.",
                )
                .env("LEXCAPTURE_HCAPTCHA_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_HCAPTCHA_VERIFY_URL)
                .long(ARG_HCAPTCHA_VERIFY_URL)
                .help("hCaptcha siteverify endpoint")
                .default_value(DEFAULT_VERIFY_URL)
                .env("LEXCAPTURE_HCAPTCHA_VERIFY_URL"),
        )
}
