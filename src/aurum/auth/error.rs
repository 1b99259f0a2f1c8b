//! Failure taxonomy for the auth entry points and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or incomplete request input.
    #[error("{0}")]
    Validation(&'static str),
    /// Bad credentials or an unusable token.
    #[error("unauthorized")]
    Unauthorized,
    #[error("user not found")]
    NotFound,
    #[error("user already exists")]
    Conflict,
    /// Store or email provider failure; `message` is what the client sees.
    #[error("{message}: {detail:#}")]
    Internal {
        message: &'static str,
        detail: anyhow::Error,
    },
}

impl AuthError {
    pub(crate) fn internal(message: &'static str, detail: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Validation(message) => message,
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "User not found",
            Self::Conflict => "User already exists",
            Self::Internal { message, detail } => {
                // Driver and provider details stay in the log.
                error!("{message}: {detail:#}");
                message
            }
        };
        (status, message.to_string()).into_response()
    }
}
