use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront::{Storefront, StorefrontArgs};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod models;
mod state;

use crate::state::AppState;

/// Largest accepted image upload
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "storefront-server")]
#[command(about = "HTTP front end for the storefront")]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "STOREFRONT_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Seconds a session may sit idle before it is dropped
    #[arg(long, env = "STOREFRONT_SESSION_IDLE_SECS", default_value_t = 1800)]
    session_idle_secs: u64,

    #[command(flatten)]
    settings: StorefrontArgs,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/v1/categories", get(api::list_categories))
        .route("/v1/genders", get(api::list_genders))
        .route("/v1/sessions", post(api::create_session))
        .route(
            "/v1/sessions/:id",
            get(api::get_session).delete(api::delete_session),
        )
        .route("/v1/sessions/:id/catalog", get(api::catalog_page))
        .route("/v1/sessions/:id/selection", put(api::update_selection))
        .route("/v1/sessions/:id/image", put(api::upload_image))
        .route("/v1/sessions/:id/search/text", post(api::search_text))
        .route("/v1/sessions/:id/search/image", post(api::search_image))
        .route("/v1/sessions/:id/reset", post(api::reset_session))
        .route(
            "/v1/review",
            get(api::review_page).post(api::submit_review),
        )
        .route("/v1/images/:product_id", get(api::product_image))
        .route("/v1/cache/invalidate", post(api::invalidate_cache))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,storefront=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ServerArgs::parse();
    let config = args
        .settings
        .into_config()
        .context("invalid configuration")?;

    tracing::info!("Connecting to the catalog database...");
    let storefront = Storefront::connect(config)
        .await
        .context("could not reach the database")?;
    let idle_timeout = Duration::from_secs(args.session_idle_secs);
    let state = Arc::new(AppState::new(storefront).with_idle_timeout(idle_timeout));

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(idle_timeout.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let expired = sweeper.sweep_idle().await;
            if expired > 0 {
                let active = sweeper.active_sessions().await;
                tracing::info!(expired, active, "Expired idle sessions");
            }
        }
    });

    let app = router(Arc::clone(&state));

    tracing::info!("Storefront server listening on {}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("cannot bind {}", args.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.storefront.close().await;
    Ok(())
}
