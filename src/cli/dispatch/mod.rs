//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_CORS_ORIGIN, ARG_DSN, ARG_PORT, auth, email};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let cors_origin = matches
        .get_one::<String>(ARG_CORS_ORIGIN)
        .cloned()
        .context("missing required argument: --cors-origin")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        cors_origin,
        jwt_secret: auth_opts.jwt_secret,
        verify_base_url: auth_opts.verify_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        verification_ttl_seconds: auth_opts.verification_ttl_seconds,
        sendgrid_api_key: email_opts.sendgrid_api_key,
        email_from_address: email_opts.from_address,
        email_from_name: email_opts.from_name,
        email_log_only: email_opts.log_only,
    }))
}
