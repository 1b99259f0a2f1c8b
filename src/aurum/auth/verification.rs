//! Email verification: issue a link on registration, flip the flag on redemption.
//!
//! Redemption is idempotent. No consumed-token ledger exists, so the same
//! verification token can be redeemed any number of times before it expires.

use super::error::AuthError;
use super::state::AuthConfig;
use super::token::{TokenKind, TokenService};
use crate::aurum::email::{EmailSender, verification_email};
use crate::aurum::store::CredentialStore;
use tracing::{debug, info, instrument};
use url::Url;

/// Build the verification link: `<base>?token=<token>`, keeping any existing query.
///
/// # Errors
/// Returns an error if `base` is not an absolute URL.
pub fn build_verify_url(base: &str, token: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Issue a verification token for `email` and hand the link to the mailer.
///
/// # Errors
/// `AuthError::Internal` if the token cannot be issued or the send fails.
#[instrument(skip_all, fields(email = %email))]
pub async fn start(
    tokens: &TokenService,
    mailer: &dyn EmailSender,
    config: &AuthConfig,
    email: &str,
) -> Result<String, AuthError> {
    let token = tokens
        .issue(email, TokenKind::Verification, config.verification_ttl())
        .map_err(|err| AuthError::internal("Failed to create verification token", err))?;

    let link = build_verify_url(config.verify_base_url(), &token)
        .map_err(|err| AuthError::internal("Failed to create verification token", err))?;

    mailer
        .send(&verification_email(email, &link))
        .await
        .map_err(|err| AuthError::internal("Failed to send verification email", err))?;

    info!("verification email sent");

    Ok(token)
}

/// Redeem a verification token and mark its subject verified.
///
/// Returns the verified email.
///
/// # Errors
/// `Unauthorized` for a bad or expired token, `NotFound` when the subject has
/// no account, `Internal` on store failure.
#[instrument(skip_all)]
pub async fn redeem(
    tokens: &TokenService,
    store: &dyn CredentialStore,
    token: &str,
) -> Result<String, AuthError> {
    let claims = tokens
        .verify_kind(token, TokenKind::Verification)
        .map_err(|err| {
            debug!(reason = %err, "verification token rejected");
            AuthError::Unauthorized
        })?;

    match store.find_user_by_email(&claims.sub).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(email = %claims.sub, "verification subject not found");
            return Err(AuthError::NotFound);
        }
        Err(err) => return Err(AuthError::internal("Error verifying email", err)),
    }

    store
        .set_verified(&claims.sub)
        .await
        .map_err(|err| AuthError::internal("Error verifying email", err))?;

    info!(email = %claims.sub, "email verified");

    Ok(claims.sub)
}
