//! HTTP service: routing, OpenAPI document and the server loop.

pub mod auth;
pub mod email;
pub mod handlers;
pub mod store;

use crate::aurum::auth::{AuthState, require_bearer};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post, put},
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::register::register,
        handlers::login::login,
        handlers::verify::verify_email,
        handlers::verify::resend_verification,
        handlers::gold::create,
        handlers::gold::list,
        handlers::gold::update,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::MessageResponse,
        handlers::register::UserRegister,
        handlers::login::UserLogin,
        handlers::login::LoginResponse,
        handlers::verify::ResendVerification,
        handlers::gold::GoldInput,
        handlers::gold::GoldItem,
        handlers::gold::GoldList,
        handlers::gold::GoldUpdated,
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "auth", description = "Registration, login and email verification"),
        (name = "gold", description = "Gold inventory, requires a bearer token"),
        (name = "health", description = "Service and credential store health"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Auth and inventory routes. Everything under `/protected` goes through the bearer gate.
pub fn router(auth_state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route(
            "/gold",
            post(handlers::gold::create).get(handlers::gold::list),
        )
        .route("/gold/:id", put(handlers::gold::update))
        .route_layer(middleware::from_fn_with_state(
            auth_state.tokens(),
            require_bearer,
        ));

    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/verify", get(handlers::verify_email))
        .route("/verify/resend", post(handlers::resend_verification))
        .nest("/protected", protected)
        .layer(Extension(auth_state))
}

async fn root() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(
    port: u16,
    pool: PgPool,
    auth_state: Arc<AuthState>,
    cors_origin: HeaderValue,
) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(cors_origin))
        .allow_credentials(true);

    let app = router(auth_state)
        .route("/", get(root))
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
