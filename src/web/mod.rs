//! Inbound API: submit jobs, poll them, and log every call.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::upstream::PlatformClient;

mod forms;
mod handlers;
mod prelude;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    db: Arc<DatabaseConnection>,
    platform: PlatformClient,
}

impl AppState {
    pub(crate) fn new(db: DatabaseConnection, platform: PlatformClient) -> Self {
        Self {
            db: Arc::new(db),
            platform,
        }
    }
}

/// `max_upload_bytes` caps the `/image2video` body, which carries the whole image
fn create_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/text2video", post(handlers::text2video_handler))
        .route(
            "/image2video",
            post(handlers::image2video_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/get_status", get(handlers::get_status_handler))
        .route("/healthz", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until `shutdown` resolves
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    db: DatabaseConnection,
    platform: PlatformClient,
    max_upload_bytes: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), anyhow::Error> {
    let app = create_router(max_upload_bytes).with_state(AppState::new(db, platform));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}
