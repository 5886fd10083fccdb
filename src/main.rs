use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kats::api::router;
use kats::db::{self, SqliteCredentialStore};
use kats::error::AppError;
use kats::kats_api::{ApiConfig, HttpKatsClient};
use kats::session::Session;
use kats::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kats=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://kats.db?mode=rwc".to_string());
    let pool = db::init_db(&database_url, 5).await?;

    let api_config = ApiConfig::new_from_env()?;
    info!("using KATS API at {}", api_config.base_url);
    let kats = Arc::new(HttpKatsClient::new(api_config)?);

    let session = Session::new(Arc::new(SqliteCredentialStore::new(pool.clone())));
    let mut state = AppState::new(pool, kats, session);
    if let Ok(dir) = std::env::var("KATS_PHOTO_DIR") {
        info!("attendance photos are read from {}", dir);
        state = state.with_photo_dir(dir);
    }

    let app = router(state);

    let addr: SocketAddr = std::env::var("KATS_LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .map_err(|e| AppError::BadRequest(format!("KATS_LISTEN_ADDR is invalid: {}", e)))?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
