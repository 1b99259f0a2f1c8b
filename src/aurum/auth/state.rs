//! Auth configuration and the registration/login orchestration.

use super::error::AuthError;
use super::password::PasswordHasher;
use super::token::{TokenError, TokenKind, TokenService};
use super::verification;
use crate::aurum::email::EmailSender;
use crate::aurum::handlers::valid_email;
use crate::aurum::store::{CredentialStore, NewUser, StoreError};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const DEFAULT_SESSION_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_VERIFICATION_TTL_SECONDS: u64 = 72 * 60 * 60;

/// Immutable auth configuration, built once at startup.
#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    verify_base_url: String,
    session_ttl: Duration,
    verification_ttl: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString, verify_base_url: String) -> Self {
        Self {
            jwt_secret,
            verify_base_url,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            verification_ttl: Duration::from_secs(DEFAULT_VERIFICATION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: u64) -> Self {
        self.verification_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn verify_base_url(&self) -> &str {
        &self.verify_base_url
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn verification_ttl(&self) -> Duration {
        self.verification_ttl
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("verify_base_url", &self.verify_base_url)
            .field("session_ttl", &self.session_ttl)
            .field("verification_ttl", &self.verification_ttl)
            .finish()
    }
}

/// Shared, read-only auth state handed to every request.
pub struct AuthState {
    config: AuthConfig,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailSender>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// # Errors
    /// Returns `TokenError::MissingKey` if the configured secret is empty and
    /// `TokenError::InvalidLifetime` if a configured TTL cannot be encoded.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Result<Self, TokenError> {
        let tokens = Arc::new(TokenService::new(config.jwt_secret.clone())?);
        tokens.issue("", TokenKind::Session, config.session_ttl)?;
        tokens.issue("", TokenKind::Verification, config.verification_ttl)?;
        Ok(Self {
            config,
            tokens,
            hasher: PasswordHasher::new(),
            store,
            mailer,
        })
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> Arc<TokenService> {
        self.tokens.clone()
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| {
                AuthError::internal("Internal server error during password encryption", err)
            })?
            .map_err(|err| {
                AuthError::internal("Internal server error during password encryption", err)
            })
    }

    async fn check_password(&self, password: &str, stored_hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|err| AuthError::internal("Internal server error", err))
    }

    /// Register an unverified user and send the verification email.
    ///
    /// The insert and the send are two independent steps: if the send fails
    /// the user row stays behind, unverified, and the caller gets an error.
    ///
    /// # Errors
    /// `Validation` for bad input, `Conflict` for a taken email, `Internal`
    /// for hashing, store or email failures.
    #[instrument(skip(self, name, password))]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), AuthError> {
        if name.trim().is_empty() {
            return Err(AuthError::Validation("Invalid name"));
        }
        if !valid_email(email) {
            return Err(AuthError::Validation("Invalid email"));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("Invalid password"));
        }

        let password_hash = self.hash_password(password).await?;

        let user = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
        };
        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Duplicate) => {
                debug!("user already exists");
                return Err(AuthError::Conflict);
            }
            Err(err) => {
                return Err(AuthError::internal(
                    "Internal server error during user insertion",
                    err,
                ));
            }
        }

        verification::start(&self.tokens, self.mailer.as_ref(), &self.config, email).await?;

        info!("user registered");

        Ok(())
    }

    /// Check credentials and issue a session token.
    ///
    /// Unknown emails and wrong passwords are both `Unauthorized`.
    ///
    /// # Errors
    /// `Unauthorized` on bad credentials, `Internal` on store or signing failure.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let user = match self.store.find_user_by_email(email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!("user not found");
                return Err(AuthError::Unauthorized);
            }
            Err(err) => return Err(AuthError::internal("Internal server error", err)),
        };

        if !self.check_password(password, user.password_hash).await? {
            debug!("password mismatch");
            return Err(AuthError::Unauthorized);
        }

        let token = self
            .tokens
            .issue(&user.email, TokenKind::Session, self.config.session_ttl())
            .map_err(|err| AuthError::internal("Internal server error", err))?;

        info!("login successful");

        Ok(token)
    }

    /// Redeem a verification token; see [`verification::redeem`].
    ///
    /// # Errors
    /// `Unauthorized`, `NotFound` or `Internal`.
    pub async fn verify_email(&self, token: &str) -> Result<String, AuthError> {
        verification::redeem(&self.tokens, self.store.as_ref(), token).await
    }

    /// Send a fresh verification email to an existing, unverified account.
    ///
    /// Returns `Ok(false)` when nothing was sent (unknown or already verified).
    ///
    /// # Errors
    /// `Internal` on store, signing or email failure.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Result<bool, AuthError> {
        match self.store.find_user_by_email(email).await {
            Ok(Some(user)) if !user.verified => {}
            Ok(_) => return Ok(false),
            Err(err) => return Err(AuthError::internal("Internal server error", err)),
        }

        verification::start(&self.tokens, self.mailer.as_ref(), &self.config, email).await?;

        Ok(true)
    }
}
