use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SENDGRID_API_KEY: &str = "sendgrid-api-key";
pub const ARG_EMAIL_FROM_ADDRESS: &str = "email-from-address";
pub const ARG_EMAIL_FROM_NAME: &str = "email-from-name";
pub const ARG_EMAIL_LOG_ONLY: &str = "email-log-only";

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` only in log-only mode.
    pub sendgrid_api_key: Option<SecretString>,
    pub from_address: String,
    pub from_name: String,
    pub log_only: bool,
}

impl Options {
    /// Parse email delivery arguments.
    ///
    /// # Errors
    /// Returns an error if the provider key is missing or blank while log-only mode is off.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let log_only = matches.get_flag(ARG_EMAIL_LOG_ONLY);

        let sendgrid_api_key = matches
            .get_one::<String>(ARG_SENDGRID_API_KEY)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .map(SecretString::from);

        if sendgrid_api_key.is_none() && !log_only {
            anyhow::bail!("missing required argument: --{ARG_SENDGRID_API_KEY}");
        }

        let read = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        Ok(Self {
            sendgrid_api_key,
            from_address: read(ARG_EMAIL_FROM_ADDRESS)?,
            from_name: read(ARG_EMAIL_FROM_NAME)?,
            log_only,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SENDGRID_API_KEY)
                .long(ARG_SENDGRID_API_KEY)
                .help("SendGrid API key used to deliver verification emails")
                .env("AURUM_SENDGRID_API_KEY")
                .hide_env_values(true)
                .required_unless_present(ARG_EMAIL_LOG_ONLY),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM_ADDRESS)
                .long(ARG_EMAIL_FROM_ADDRESS)
                .help("Sender address for outgoing email")
                .env("AURUM_EMAIL_FROM_ADDRESS")
                .default_value("noreply@aurum.local"),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM_NAME)
                .long(ARG_EMAIL_FROM_NAME)
                .help("Sender display name for outgoing email")
                .env("AURUM_EMAIL_FROM_NAME")
                .default_value("Aurum"),
        )
        .arg(
            Arg::new(ARG_EMAIL_LOG_ONLY)
                .long(ARG_EMAIL_LOG_ONLY)
                .help("Log verification emails instead of sending them")
                .env("AURUM_EMAIL_LOG_ONLY")
                .action(ArgAction::SetTrue),
        )
}
