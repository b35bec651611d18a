//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use anyhow::Context;
use attendance::{
    AttendanceConfig, HttpFaceMatchService, PgAttendanceRepository, SessionFeedHub,
    attendance_router, spawn_change_listener,
};
use axum::{
    Router, http,
    http::{Method, header},
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,attendance=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Attendance configuration
    let mut config = if cfg!(debug_assertions) {
        AttendanceConfig::development()
    } else {
        AttendanceConfig::default()
    };
    if let Ok(url) = env::var("PUBLIC_BASE_URL") {
        config = config.with_public_base_url(url);
    }
    if let Ok(url) = env::var("FACE_SERVICE_URL") {
        config = config.with_face_service_url(url);
    }
    if let Ok(secs) = env::var("FACE_MATCH_TIMEOUT_SECS") {
        let secs: u64 = secs
            .parse()
            .context("FACE_MATCH_TIMEOUT_SECS must be a whole number of seconds")?;
        config = config.with_face_match_timeout(Duration::from_secs(secs));
    }

    tracing::info!(
        public_base_url = %config.public_base_url,
        face_service_url = %config.face_service_url,
        face_match_timeout_secs = config.face_match_timeout.as_secs(),
        "Attendance configuration loaded"
    );

    // Live feed, fed by database notifications
    let feed = Arc::new(SessionFeedHub::new(config.live_feed_capacity));
    let _listener = spawn_change_listener(pool.clone(), feed.clone()).await?;

    let face_match = HttpFaceMatchService::new(&config)?;
    let repo = PgAttendanceRepository::new(pool.clone());

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest(
            "/api/attendance",
            attendance_router(repo, face_match, feed, config),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 31113));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
