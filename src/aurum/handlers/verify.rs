//! Email verification endpoints.

use super::{INVALID_PAYLOAD, MessageResponse};
use crate::aurum::auth::AuthState;
use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(IntoParams, Deserialize, Debug)]
pub struct VerifyQuery {
    /// Verification token from the emailed link.
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerification {
    pub email: String,
}

/// Redeem a verification token. Redeeming the same token again is a no-op success.
#[utoipa::path(
    get,
    path = "/verify",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Token is missing", body = String),
        (status = 401, description = "Invalid or expired token", body = String),
        (status = 404, description = "User not found", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    auth_state: Extension<Arc<AuthState>>,
    query: Option<Query<VerifyQuery>>,
) -> Response {
    let token = query
        .and_then(|Query(query)| query.token)
        .map(|token| token.trim().to_string())
        .unwrap_or_default();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Token is missing".to_string()).into_response();
    }

    match auth_state.verify_email(&token).await {
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Email successfully verified")),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Resend a verification email (always returns 204 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/verify/resend",
    request_body = ResendVerification,
    responses(
        (status = 204, description = "Resend accepted"),
        (status = 400, description = "Invalid request payload", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_verification(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerification>>,
) -> Response {
    let request: ResendVerification = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, INVALID_PAYLOAD.to_string()).into_response(),
    };

    if let Err(err) = auth_state.resend_verification(&request.email).await {
        // Keep the response opaque; the failure is only logged.
        error!("Failed to resend verification: {err}");
    }

    StatusCode::NO_CONTENT.into_response()
}
