use crate::{
    aurum::{
        self,
        auth::{AuthConfig, AuthState},
        email::{EmailSender, LogEmailSender, SendGridConfig, SendGridSender},
        store::PgCredentialStore,
    },
    cli::telemetry,
};
use anyhow::{Context, Result, anyhow};
use axum::http::HeaderValue;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub cors_origin: String,
    pub jwt_secret: SecretString,
    pub verify_base_url: String,
    pub session_ttl_seconds: u64,
    pub verification_ttl_seconds: u64,
    pub sendgrid_api_key: Option<SecretString>,
    pub email_from_address: String,
    pub email_from_name: String,
    pub email_log_only: bool,
}

fn mailer(args: &Args) -> Result<Arc<dyn EmailSender>> {
    if args.email_log_only {
        info!("Email delivery disabled, verification emails are only logged");
        return Ok(Arc::new(LogEmailSender));
    }

    let api_key = args
        .sendgrid_api_key
        .clone()
        .ok_or_else(|| anyhow!("SendGrid API key is required unless --email-log-only is set"))?;

    let sender = SendGridSender::new(SendGridConfig::new(
        api_key,
        args.email_from_address.clone(),
        args.email_from_name.clone(),
    ))?;

    Ok(Arc::new(sender))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let cors_origin = HeaderValue::from_str(&args.cors_origin)
        .with_context(|| format!("Invalid CORS origin: {}", args.cors_origin))?;

    let mailer = mailer(&args)?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let config = AuthConfig::new(args.jwt_secret, args.verify_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_verification_ttl_seconds(args.verification_ttl_seconds);

    debug!("Auth config: {:?}", config);

    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let auth_state = AuthState::new(config, store, mailer).context("Invalid auth configuration")?;

    let result = aurum::new(args.port, pool, Arc::new(auth_state), cors_origin).await;

    telemetry::shutdown_tracer();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(log_only: bool, key: Option<&str>) -> Args {
        Args {
            port: 8080,
            dsn: "postgres://localhost/aurum".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            jwt_secret: SecretString::from("secret"),
            verify_base_url: "http://localhost:8080/verify".to_string(),
            session_ttl_seconds: 3600,
            verification_ttl_seconds: 259_200,
            sendgrid_api_key: key.map(SecretString::from),
            email_from_address: "noreply@aurum.local".to_string(),
            email_from_name: "Aurum".to_string(),
            email_log_only: log_only,
        }
    }

    #[test]
    fn mailer_log_only_without_key() {
        assert!(mailer(&args(true, None)).is_ok());
    }

    #[test]
    fn mailer_requires_key_when_sending() {
        assert!(mailer(&args(false, None)).is_err());
        assert!(mailer(&args(false, Some("SG.key"))).is_ok());
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", args(false, Some("SG.key")));
        assert!(!rendered.contains("SG.key"));
        assert!(!rendered.contains("\"secret\""));
    }
}
