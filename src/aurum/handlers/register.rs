use super::{INVALID_PAYLOAD, MessageResponse};
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
pub struct UserRegister {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for UserRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRegister")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[utoipa::path(
    post,
    path= "/register",
    request_body = UserRegister,
    responses (
        (status = 201, description = "Registration successful, verification email sent", body = MessageResponse, content_type = "application/json"),
        (status = 400, description = "Invalid request payload", body = String),
        (status = 409, description = "User with the specified email already exists", body = String),
        (status = 500, description = "Store or email provider failure", body = String),
    ),
    tag= "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserRegister>>,
) -> Response {
    let user: UserRegister = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, INVALID_PAYLOAD.to_string()).into_response(),
    };

    match auth_state
        .register(&user.name, &user.email, &user.password)
        .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(MessageResponse::new(
                "User registered successfully. Please verify your email.",
            )),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
