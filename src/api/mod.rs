use crate::{
    captcha::HCaptchaVerifier,
    rate_limit::{FallbackRateLimiter, MemoryRateLimiter, PgRateLimiter, SWEEP_INTERVAL},
    storage::Stores,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod background;
pub mod error;
pub mod handlers;
mod openapi;
pub mod state;

pub use openapi::openapi;
use handlers::{admin, content, health, register, track};
use state::{AppConfig, AppState};

/// Everything `new` needs besides the listen port and DSN.
#[derive(Debug)]
pub struct ServerSettings {
    pub allowed_origins: Vec<String>,
    pub config: AppConfig,
    pub hcaptcha_secret: Option<SecretString>,
    pub hcaptcha_verify_url: String,
    pub admin_secret: Option<SecretString>,
}

/// Every route, without state or middleware.
///
/// Handlers read `Arc<AppState>` (and `/health` a `PgPool`) from
/// extensions, so callers layer those on top.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/register", post(register::register))
        .route("/track", post(track::track))
        .route("/content", get(content::content))
        .route("/health", get(health::health).head(health::health))
        .nest("/admin", admin::router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, settings: ServerSettings) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let memory_limiter = Arc::new(MemoryRateLimiter::new());
    let _sweeper = MemoryRateLimiter::spawn_sweeper(&memory_limiter, SWEEP_INTERVAL);
    let limiter = FallbackRateLimiter::new(
        Arc::new(PgRateLimiter::new(pool.clone())),
        memory_limiter,
    );

    let captcha = HCaptchaVerifier::new(settings.hcaptcha_secret, settings.hcaptcha_verify_url)?;
    if !captcha.is_configured() {
        info!("hCaptcha secret not set; registrations will be refused");
    }

    let unsafe_secret = settings.admin_secret.as_ref().is_some_and(|secret| {
        let secret = secret.expose_secret().trim();
        !secret.is_empty() && !admin::is_cookie_safe(secret)
    });
    if unsafe_secret {
        return Err(anyhow!("admin secret cannot be stored in the login cookie"));
    }

    let credentials = admin::SharedSecretChecker::new(settings.admin_secret);
    if !admin::CredentialChecker::is_configured(&credentials) {
        info!("Admin secret not set; admin routes will answer 503");
    }

    let state = Arc::new(AppState::new(
        settings.config,
        Stores::postgres(pool.clone()),
        Arc::new(captcha),
        Arc::new(limiter),
        Arc::new(credentials),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_origin(AllowOrigin::list(allowed_origins(&settings.allowed_origins)?))
        .allow_credentials(true);

    let app = router().layer(
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
            .layer(Extension(state))
            .layer(Extension(pool)),
    );

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT")?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
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

/// Reduce each configured URL to a bare `scheme://host[:port]` origin.
fn allowed_origins(urls: &[String]) -> Result<Vec<HeaderValue>> {
    if urls.is_empty() {
        return Err(anyhow!("At least one allowed origin is required"));
    }
    urls.iter().map(|url| origin(url)).collect()
}

fn origin(url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid origin URL: {url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Origin URL must include a valid host: {url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build origin header")
}
