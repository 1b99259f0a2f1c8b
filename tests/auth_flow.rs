use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aurum::aurum::{
    auth::{
        AuthConfig, AuthState, AuthenticatedUser, PasswordHasher, TokenError, TokenKind,
        require_bearer,
    },
    email::{EmailMessage, EmailSender},
    router,
    store::{CredentialStore, NewUser, StoreError, UserRecord},
};
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    response::Response,
    routing::get,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const VERIFY_BASE: &str = "http://localhost:8080/verify";

#[derive(Default)]
struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    fn user(&self, email: &str) -> Option<UserRecord> {
        self.users.lock().ok()?.get(email).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        let mut users = self.users.lock().expect("store lock");
        if users.contains_key(&user.email) {
            return Err(StoreError::Duplicate);
        }
        users.insert(
            user.email.clone(),
            UserRecord {
                name: user.name.clone(),
                email: user.email.clone(),
                password_hash: user.password_hash.clone(),
                verified: false,
            },
        );
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.user(email))
    }

    async fn set_verified(&self, email: &str) -> Result<bool, StoreError> {
        let mut users = self.users.lock().expect("store lock");
        Ok(users
            .get_mut(email)
            .map(|user| user.verified = true)
            .is_some())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    fn last(&self) -> Option<EmailMessage> {
        self.sent.lock().ok()?.last().cloned()
    }

    fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("provider rejected the message"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

struct Harness {
    state: Arc<AuthState>,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

impl Harness {
    fn new() -> Result<Self> {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let config = AuthConfig::new(SecretString::from(SECRET), VERIFY_BASE.to_string());
        let state = AuthState::new(config, store.clone(), mailer.clone())?
            .with_hasher(PasswordHasher::with_params(8, 1, 1)?);
        Ok(Self {
            state: Arc::new(state),
            store,
            mailer,
        })
    }

    fn app(&self) -> Router {
        router(self.state.clone())
    }

    async fn call(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.app().oneshot(request).await?)
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<Response> {
        self.call(json_request(
            Method::POST,
            "/register",
            &json!({ "name": name, "email": email, "password": password }),
        )?)
        .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<Response> {
        self.call(json_request(
            Method::POST,
            "/login",
            &json!({ "email": email, "password": password }),
        )?)
        .await
    }

    async fn verify(&self, token: &str) -> Result<Response> {
        self.call(
            Request::builder()
                .uri(format!("/verify?token={token}"))
                .body(Body::empty())?,
        )
        .await
    }

    fn emailed_token(&self) -> Result<String> {
        let message = self.mailer.last().ok_or_else(|| anyhow!("no email sent"))?;
        let start = message
            .html_body
            .find("token=")
            .ok_or_else(|| anyhow!("no token in link"))?
            + "token=".len();
        let rest = &message.html_body[start..];
        let end = rest.find('"').ok_or_else(|| anyhow!("unterminated link"))?;
        Ok(rest[..end].to_string())
    }
}

fn json_request(method: Method, uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

async fn body_text(response: Response) -> Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

async fn body_json(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn register_stores_hashed_user_and_sends_link() -> Result<()> {
    let h = Harness::new()?;

    let response = h.register("Alice", "a@x.com", "p1").await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    assert!(
        body["message"]
            .as_str()
            .is_some_and(|m| m.contains("verify your email"))
    );

    let user = h.store.user("a@x.com").ok_or_else(|| anyhow!("user missing"))?;
    assert_eq!(user.name, "Alice");
    assert!(!user.verified);
    assert_ne!(user.password_hash, "p1");
    assert!(user.password_hash.starts_with("$argon2id$"));

    assert_eq!(h.mailer.count(), 1);
    let message = h.mailer.last().ok_or_else(|| anyhow!("no email"))?;
    assert_eq!(message.to_email, "a@x.com");
    assert!(message.html_body.contains(VERIFY_BASE));

    let token = h.emailed_token()?;
    let claims = h.state.tokens().verify(&token)?;
    assert_eq!(claims.sub, "a@x.com");
    assert_eq!(claims.kind, TokenKind::Verification);
    Ok(())
}

#[tokio::test]
async fn register_rejects_bad_input() -> Result<()> {
    let h = Harness::new()?;

    let response = h.register("Alice", "not-an-email", "p1").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .call(
            Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await?, "Invalid request payload");

    assert_eq!(h.mailer.count(), 0);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts() -> Result<()> {
    let h = Harness::new()?;
    assert_eq!(
        h.register("Alice", "a@x.com", "p1").await?.status(),
        StatusCode::CREATED
    );

    let response = h.register("Other", "a@x.com", "p2").await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(h.mailer.count(), 1);

    let user = h.store.user("a@x.com").ok_or_else(|| anyhow!("user missing"))?;
    assert_eq!(user.name, "Alice");
    Ok(())
}

#[tokio::test]
async fn email_failure_leaves_unverified_user() -> Result<()> {
    let h = Harness::new()?;
    h.mailer.fail.store(true, Ordering::SeqCst);

    let response = h.register("Alice", "a@x.com", "p1").await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await?, "Failed to send verification email");

    let user = h.store.user("a@x.com").ok_or_else(|| anyhow!("user missing"))?;
    assert!(!user.verified);

    // Recovery path: resend once the provider is back.
    h.mailer.fail.store(false, Ordering::SeqCst);
    let response = h
        .call(json_request(
            Method::POST,
            "/verify/resend",
            &json!({ "email": "a@x.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.mailer.count(), 1);

    let token = h.emailed_token()?;
    assert_eq!(h.verify(&token).await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn verification_is_idempotent() -> Result<()> {
    let h = Harness::new()?;
    h.register("Alice", "a@x.com", "p1").await?;
    let token = h.emailed_token()?;

    let response = h.verify(&token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await?["message"].as_str(),
        Some("Email successfully verified")
    );
    assert!(h.store.user("a@x.com").is_some_and(|u| u.verified));

    let response = h.verify(&token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.user("a@x.com").is_some_and(|u| u.verified));
    Ok(())
}

#[tokio::test]
async fn verify_rejects_missing_bad_and_unknown() -> Result<()> {
    let h = Harness::new()?;

    let response = h
        .call(Request::builder().uri("/verify").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await?, "Token is missing");

    assert_eq!(
        h.verify("abc.def.ghi").await?.status(),
        StatusCode::UNAUTHORIZED
    );

    let orphan = h.state.tokens().issue(
        "ghost@x.com",
        TokenKind::Verification,
        Duration::from_secs(60),
    )?;
    let response = h.verify(&orphan).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await?, "User not found");
    Ok(())
}

#[tokio::test]
async fn session_token_cannot_verify_email() -> Result<()> {
    let h = Harness::new()?;
    h.register("Alice", "a@x.com", "p1").await?;

    let session = h
        .state
        .tokens()
        .issue("a@x.com", TokenKind::Session, Duration::from_secs(60))?;
    assert_eq!(h.verify(&session).await?.status(), StatusCode::UNAUTHORIZED);
    assert!(h.store.user("a@x.com").is_some_and(|u| !u.verified));
    Ok(())
}

#[tokio::test]
async fn login_issues_session_token() -> Result<()> {
    let h = Harness::new()?;
    h.register("Alice", "a@x.com", "p1").await?;

    let response = h.login("a@x.com", "p1").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["message"].as_str(), Some("Login successful"));
    let token = body["token"]
        .as_str()
        .ok_or_else(|| anyhow!("no token"))?
        .to_string();

    let claims = h.state.tokens().verify(&token)?;
    assert_eq!(claims.sub, "a@x.com");
    assert_eq!(claims.kind, TokenKind::Session);
    assert_eq!(claims.exp - claims.iat, 3600);
    Ok(())
}

#[tokio::test]
async fn login_failures_are_indistinguishable() -> Result<()> {
    let h = Harness::new()?;
    h.register("Alice", "a@x.com", "p1").await?;

    let wrong = h.login("a@x.com", "nope").await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong_body = body_text(wrong).await?;
    assert!(!wrong_body.contains('.'));

    let unknown = h.login("b@x.com", "p1").await?;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(unknown).await?, wrong_body);
    Ok(())
}

#[tokio::test]
async fn resend_is_opaque() -> Result<()> {
    let h = Harness::new()?;

    let response = h
        .call(json_request(
            Method::POST,
            "/verify/resend",
            &json!({ "email": "nobody@x.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.mailer.count(), 0);

    h.register("Alice", "a@x.com", "p1").await?;
    let token = h.emailed_token()?;
    h.verify(&token).await?;

    let response = h
        .call(json_request(
            Method::POST,
            "/verify/resend",
            &json!({ "email": "a@x.com" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.mailer.count(), 1);
    Ok(())
}

fn gated_app(h: &Harness, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/whoami",
            get(move |Extension(user): Extension<AuthenticatedUser>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    user.email
                }
            }),
        )
        .route_layer(middleware::from_fn_with_state(
            h.state.tokens(),
            require_bearer,
        ))
}

async fn call_gated(
    h: &Harness,
    hits: &Arc<AtomicUsize>,
    authorization: Option<String>,
) -> Result<Response> {
    let mut request = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, HeaderValue::from_str(&value)?);
    }
    Ok(gated_app(h, hits.clone())
        .oneshot(request.body(Body::empty())?)
        .await?)
}

#[tokio::test]
async fn gate_forwards_valid_session_once() -> Result<()> {
    let h = Harness::new()?;
    h.register("Alice", "a@x.com", "p1").await?;
    let body = body_json(h.login("a@x.com", "p1").await?).await?;
    let token = body["token"].as_str().ok_or_else(|| anyhow!("no token"))?;

    let hits = Arc::new(AtomicUsize::new(0));
    let response = call_gated(&h, &hits, Some(format!("Bearer {token}"))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await?, "a@x.com");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn gate_rejects_without_calling_handler() -> Result<()> {
    let h = Harness::new()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let verification =
        h.state
            .tokens()
            .issue("a@x.com", TokenKind::Verification, Duration::from_secs(60))?;
    let session = h
        .state
        .tokens()
        .issue("a@x.com", TokenKind::Session, Duration::from_secs(60))?;

    let expired =
        h.state
            .tokens()
            .issue_at("a@x.com", TokenKind::Session, Duration::from_secs(60), 1_000)?;
    assert!(matches!(
        h.state.tokens().verify(&expired),
        Err(TokenError::Expired)
    ));

    let cases = [
        (None, "Missing token"),
        (Some(session.clone()), "Invalid token format"),
        (Some(format!("Basic {session}")), "Invalid token format"),
        (Some("Bearer not.a.jwt".to_string()), "Invalid or expired token"),
        (
            Some(format!("Bearer {verification}")),
            "Invalid or expired token",
        ),
        (Some(format!("Bearer {expired}")), "Invalid or expired token"),
    ];

    for (authorization, expected) in cases {
        let response = call_gated(&h, &hits, authorization).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await?, expected);
    }

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn gate_rejects_token_signed_with_other_secret() -> Result<()> {
    let h = Harness::new()?;
    let other = Harness {
        state: Arc::new(AuthState::new(
            AuthConfig::new(SecretString::from("another-secret"), VERIFY_BASE.to_string()),
            h.store.clone(),
            h.mailer.clone(),
        )?),
        store: h.store.clone(),
        mailer: h.mailer.clone(),
    };
    let forged = other
        .state
        .tokens()
        .issue("a@x.com", TokenKind::Session, Duration::from_secs(60))?;

    let hits = Arc::new(AtomicUsize::new(0));
    let response = call_gated(&h, &hits, Some(format!("Bearer {forged}"))).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn protected_inventory_requires_bearer() -> Result<()> {
    let h = Harness::new()?;
    let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@127.0.0.1:1/postgres")?;
    let app = h.app().layer(Extension(pool));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/protected/gold").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let session = h
        .state
        .tokens()
        .issue("a@x.com", TokenKind::Session, Duration::from_secs(60))?;
    let mut request = json_request(
        Method::POST,
        "/protected/gold",
        &json!({ "name": "Bar", "karat": 99, "weight": 1.0, "price": 1.0 }),
    )?;
    request.headers_mut().insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {session}"))?,
    );
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await?, "Karat must be between 1 and 24");
    Ok(())
}
