pub mod authentication;
pub mod config;
pub mod data_formats;
pub mod db_helpers;
pub mod errors;
mod handlers;
pub mod media;
pub mod models;
pub mod rate_limit;

use std::{net::SocketAddr, str::FromStr, sync::Arc, sync::LazyLock, time::Duration};

use anyhow::Context;
pub use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::{middleware, routing::*, Extension, Json, Router};
use config::Config;
pub use data_formats::*;
use handlers::*;
use media::{CloudinaryStore, DisabledMediaStore, MediaStore};
use rate_limit::{limit_by_ip, RateLimiter};
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub type JsonResponse<T> = (StatusCode, Json<T>);

/// Five images of at most 5 MiB each plus the text fields.
const POST_BODY_LIMIT: usize = 26 * 1024 * 1024;

/// Process-wide resources handed to every request.
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub media: Arc<dyn MediaStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, media: Arc<dyn MediaStore>) -> Self {
        AppState {
            pool,
            config,
            media,
        }
    }
}

/// Installs the fmt subscriber, filtered by `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogsphere=info,create_admin=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run_app(config: Config) -> Result<()> {
    let pool = init_db(&config.database_url).await?;
    let media: Arc<dyn MediaStore> = match &config.cloudinary {
        Some(cloudinary) => Arc::new(CloudinaryStore::new(cloudinary.clone())),
        None => {
            tracing::warn!("Cloudinary is not configured, image uploads are disabled");
            Arc::new(DisabledMediaStore)
        }
    };
    let address = config.bind_addr;
    let state = Arc::new(AppState::new(pool.clone(), config, media));

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server started on {}", address);
    let app = make_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Closing database pool");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("Invalid DATABASE_URL {}", db_url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    // Every connection to :memory: opens its own database, so keep exactly one alive.
    let pool = if db_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };

    tracing::info!("Running migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed");
    Ok(pool)
}

pub fn make_router(state: Arc<AppState>) -> Router {
    let limits = state.config.rate_limits;
    let general_limiter = Arc::new(RateLimiter::new(
        limits.general,
        "Too many requests from this IP, please try again later.",
        limits.trust_forwarded,
    ));
    let auth_limiter = Arc::new(RateLimiter::new(
        limits.auth,
        "Too many authentication attempts, please try again later.",
        limits.trust_forwarded,
    ));

    let auth = Router::new()
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/logout", post(logout_user))
        .route("/profile", get(get_current_user).put(update_current_user))
        .layer(middleware::from_fn_with_state(auth_limiter, limit_by_ip));

    let posts = Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/trending", get(trending_posts))
        .route("/author/:author_id", get(posts_by_author))
        .route("/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/:id/like", post(toggle_like))
        .route("/:id/related", get(related_posts))
        .layer(DefaultBodyLimit::max(POST_BODY_LIMIT));

    let categories = Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/:id",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        );

    let comments = Router::new()
        .route(
            "/post/:post_id",
            get(list_comments_for_post).post(add_comment),
        )
        .route("/user/:user_id", get(list_comments_by_user))
        .route(
            "/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        );

    let api = Router::new()
        .nest("/auth", auth)
        .nest("/posts", posts)
        .nest("/categories", categories)
        .nest("/comments", comments)
        .layer(middleware::from_fn_with_state(general_limiter, limit_by_ip));

    let cors = cors_layer(&state.config.client_url);

    Router::new()
        .route("/", get(root))
        .route("/check_health", get(alive))
        .nest("/api", api)
        .fallback(not_found)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = client_url
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("slug pattern is valid"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Lower-cases, drops everything but ASCII word characters, whitespace and
/// hyphens, then joins whitespace runs with a single hyphen.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    WHITESPACE_RUNS.replace_all(&stripped, "-").into_owned()
}
