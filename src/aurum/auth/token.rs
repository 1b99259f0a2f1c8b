//! Signed, time-bound bearer tokens.
//!
//! Tokens are compact HS256 JWS strings (`header.claims.signature`, base64url
//! without padding). Session and verification tokens share the signing scheme
//! and differ only by the `kind` claim.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALG_HS256: &str = "HS256";
const TYP_JWT: &str = "JWT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Verification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG_HS256.to_string(),
            typ: TYP_JWT.to_string(),
        }
    }
}

/// Claims carried by every token. `sub` is the account email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing key is missing")]
    MissingKey,
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected token kind: {0:?}")]
    WrongKind(TokenKind),
    #[error("invalid token lifetime")]
    InvalidLifetime,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Issues and verifies tokens under the process-wide signing secret.
///
/// The secret is fixed for the lifetime of the service; there is no rotation.
pub struct TokenService {
    secret: SecretString,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"***")
            .finish()
    }
}

impl TokenService {
    /// # Errors
    /// Returns `TokenError::MissingKey` if the secret is empty.
    pub fn new(secret: SecretString) -> Result<Self, TokenError> {
        if secret.expose_secret().is_empty() {
            return Err(TokenError::MissingKey);
        }
        Ok(Self { secret })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::MissingKey)
    }

    /// Issue a token for `subject` valid for `lifetime` from now.
    ///
    /// # Errors
    /// Returns an error if the lifetime overflows or the claims cannot be encoded.
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        lifetime: Duration,
    ) -> Result<String, TokenError> {
        self.issue_at(subject, kind, lifetime, now_unix_seconds())
    }

    /// Issue a token as if the current time were `now` (Unix seconds).
    ///
    /// # Errors
    /// Returns an error if the lifetime overflows or the claims cannot be encoded.
    pub fn issue_at(
        &self,
        subject: &str,
        kind: TokenKind,
        lifetime: Duration,
        now: i64,
    ) -> Result<String, TokenError> {
        let lifetime =
            i64::try_from(lifetime.as_secs()).map_err(|_| TokenError::InvalidLifetime)?;
        let exp = now
            .checked_add(lifetime)
            .ok_or(TokenError::InvalidLifetime)?;

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp,
            kind,
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify signature and expiry, returning the decoded claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, names an algorithm other than
    /// HS256, carries a bad signature, or has expired.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, now_unix_seconds())
    }

    /// Verify as if the current time were `now` (Unix seconds).
    ///
    /// # Errors
    /// See [`TokenService::verify`].
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        // Algorithm is checked before any key material is used.
        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG_HS256 {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Verify a token and require it to have been issued for `kind`.
    ///
    /// # Errors
    /// See [`TokenService::verify`]; additionally `TokenError::WrongKind`.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.verify_kind_at(token, kind, now_unix_seconds())
    }

    /// # Errors
    /// See [`TokenService::verify_kind`].
    pub fn verify_kind_at(
        &self,
        token: &str,
        kind: TokenKind,
        now: i64,
    ) -> Result<Claims, TokenError> {
        let claims = self.verify_at(token, now)?;
        if claims.kind != kind {
            return Err(TokenError::WrongKind(claims.kind));
        }
        Ok(claims)
    }
}
