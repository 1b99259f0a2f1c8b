//! Auth Gate: bearer-token middleware for protected routes.
//!
//! Policy: the `Authorization` header must read exactly `Bearer <token>`.
//! Anything else is rejected before the token is looked at. On success the
//! request is forwarded with an [`AuthenticatedUser`] extension attached; on
//! failure the wrapped handler never runs.

use super::token::{TokenError, TokenKind, TokenService};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const BEARER_PREFIX: &str = "Bearer ";

/// Subject of a verified session token, available to protected handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub email: String,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("missing authorization header")]
    Missing,
    #[error("malformed authorization header")]
    Malformed,
    #[error("invalid token: {0}")]
    Invalid(#[from] TokenError),
}

impl GateError {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Missing => "Missing token",
            Self::Malformed => "Invalid token format",
            Self::Invalid(_) => "Invalid or expired token",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.message().to_string()).into_response()
    }
}

/// Extract the token from an `Authorization` header value.
///
/// # Errors
/// `Missing` for an absent or empty header, `Malformed` when the value is not
/// `Bearer <token>`.
pub fn bearer_token(value: Option<&HeaderValue>) -> Result<&str, GateError> {
    let Some(value) = value else {
        return Err(GateError::Missing);
    };
    if value.is_empty() {
        return Err(GateError::Missing);
    }

    let value = value.to_str().map_err(|_| GateError::Malformed)?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(GateError::Malformed)?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(GateError::Malformed);
    }

    Ok(token)
}

/// Verify the session token carried by `headers`.
///
/// # Errors
/// See [`GateError`].
pub fn authenticate(
    tokens: &TokenService,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, GateError> {
    let token = bearer_token(headers.get(AUTHORIZATION))?;
    let claims = tokens.verify_kind(token, TokenKind::Session)?;
    Ok(AuthenticatedUser { email: claims.sub })
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn require_bearer(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&tokens, request.headers()) {
        Ok(user) => {
            debug!(email = %user.email, "token valid");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => {
            match &err {
                GateError::Invalid(reason) => warn!(%reason, "rejected bearer token"),
                other => debug!(reason = %other, "rejected request"),
            }
            err.into_response()
        }
    }
}
