//! HTTP API.
//!
//! Exposes the extraction service as JSON endpoints:
//! - `GET /api/mediafire?url=...` for file-locker pages
//! - `GET /api/pinterest?url=...` (alias `/api/pin`) for pin pages
//! - `GET /health`

mod handlers;
mod routes;

pub use handlers::ApiResponse;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::pipeline::ExtractService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExtractService>,
}

impl AppState {
    pub fn new(service: Arc<ExtractService>) -> Self {
        Self { service }
    }

    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(ExtractService::from_settings(settings)?)))
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", settings.bind))?;

    let state = AppState::from_settings(settings)?;
    let sweeper = state.service.spawn_cache_sweeper();
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
