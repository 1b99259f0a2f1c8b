use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_VERIFY_BASE_URL: &str = "verify-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_VERIFICATION_TTL_SECONDS: &str = "verification-ttl-seconds";

/// Upper bound for token lifetimes (ten years).
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub verify_base_url: String,
    pub session_ttl_seconds: u64,
    pub verification_ttl_seconds: u64,
}

impl Options {
    /// Parse token and verification-link arguments.
    ///
    /// # Errors
    /// Returns an error if the secret is empty or the verify URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let verify_base_url = matches
            .get_one::<String>(ARG_VERIFY_BASE_URL)
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_VERIFY_BASE_URL}"))?;
        Url::parse(&verify_base_url)
            .with_context(|| format!("Invalid verify base URL: {verify_base_url}"))?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            verify_base_url,
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(3600),
            verification_ttl_seconds: matches
                .get_one::<u64>(ARG_VERIFICATION_TTL_SECONDS)
                .copied()
                .unwrap_or(259_200),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign session and verification tokens")
                .env("AURUM_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_VERIFY_BASE_URL)
                .long(ARG_VERIFY_BASE_URL)
                .help("Base URL of the verification link sent by email")
                .env("AURUM_VERIFY_BASE_URL")
                .default_value("http://localhost:8080/verify"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Login token TTL in seconds")
                .env("AURUM_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_TTL_SECONDS)
                .long(ARG_VERIFICATION_TTL_SECONDS)
                .help("Email verification token TTL in seconds")
                .env("AURUM_VERIFICATION_TTL_SECONDS")
                .default_value("259200")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
}
