//! SkillSwap Backend Server
//!
//! REST and WebSocket API for the SkillSwap marketplace: profiles, skill
//! search, swap requests and their lifecycle, ratings and notifications.

use std::net::SocketAddr;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skillswap_server::config::Config;
use skillswap_server::jobs;
use skillswap_server::routes;
use skillswap_server::state::AppState;
use skillswap_server::store::{PgStore, Repositories};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillswap_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let repos = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PgStore::connect(url, config.database_max_connections).await?;
            tracing::info!("Database connected successfully");
            Repositories::postgres(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            Repositories::in_memory()
        }
    };

    let app_state = AppState::new(repos, &config);

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match config.counter_audit_cron.as_deref() {
        Some(cron) => Some(jobs::start_counter_audit(cron, app_state.user_service.clone()).await?),
        None => {
            tracing::info!("Counter audit disabled");
            None
        }
    };

    let app = routes::app(app_state)
        .layer(configure_cors(&config.cors_allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    tracing::info!("Server starting on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn configure_cors(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return Ok(CorsLayer::permissive());
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("Invalid CORS origin {origin:?}: {e}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any))
}
