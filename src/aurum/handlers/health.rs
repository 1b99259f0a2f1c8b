use crate::GIT_COMMIT_HASH;
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{Instrument, info_span, warn};
use utoipa::ToSchema;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Health {
    pub status: String,
    pub store: String,
    pub version: String,
    pub commit: String,
}

impl Health {
    fn report(store_up: bool) -> Self {
        Self {
            status: if store_up { "ok" } else { "degraded" }.to_string(),
            store: if store_up { "reachable" } else { "unreachable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: GIT_COMMIT_HASH.to_string(),
        }
    }
}

async fn store_reachable(pool: &PgPool) -> bool {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let ping = sqlx::query("SELECT 1").execute(pool).instrument(span);

    match tokio::time::timeout(PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            warn!("credential store ping failed: {err}");
            false
        }
        Err(_) => {
            warn!("credential store ping timed out");
            false
        }
    }
}

/// Liveness plus credential store reachability. Login and registration are
/// unusable while the store is down, so that case answers 503.
#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Credential store reachable", body = Health),
        (status = 503, description = "Credential store unreachable", body = Health)
    ),
    tag= "health"
)]
pub async fn health(Extension(pool): Extension<PgPool>) -> Response {
    let store_up = store_reachable(&pool).await;
    let status = if store_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(Health::report(store_up))).into_response()
}
