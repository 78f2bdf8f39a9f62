pub mod admin;
pub mod captcha;
pub mod limits;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgMatches, ColorChoice, Command,
};

pub const ARG_ALLOWED_ORIGINS: &str = "allowed-origins";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Browser origins allowed by CORS, comma separated on the command line.
#[must_use]
pub fn allowed_origins(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>(ARG_ALLOWED_ORIGINS)
        .map(|values| {
            values
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("lexcapture")
        .about("Lead capture and consent registry")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("LEXCAPTURE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("LEXCAPTURE_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ALLOWED_ORIGINS)
                .long(ARG_ALLOWED_ORIGINS)
                .help("Comma separated list of origins allowed by CORS")
                .default_value(DEFAULT_ALLOWED_ORIGIN)
                .env("LEXCAPTURE_ALLOWED_ORIGINS")
                .value_delimiter(','),
        );

    let command = captcha::with_args(command);
    let command = admin::with_args(command);
    let command = limits::with_args(command);
    logging::with_args(command)
}
