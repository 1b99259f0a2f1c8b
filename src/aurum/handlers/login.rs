use super::INVALID_PAYLOAD;
use crate::aurum::auth::AuthState;
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for UserLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLogin")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

#[utoipa::path(
    post,
    path= "/login",
    request_body = UserLogin,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Invalid request payload", body = String),
        (status = 401, description = "Unknown email or wrong password", body = String),
    ),
    tag= "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserLogin>>,
) -> Response {
    let user: UserLogin = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, INVALID_PAYLOAD.to_string()).into_response(),
    };

    match auth_state.login(&user.email, &user.password).await {
        Ok(token) => (
            StatusCode::OK,
            Json(LoginResponse {
                message: "Login successful".to_string(),
                token,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
