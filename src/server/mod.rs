//! HTTP surface
//!
//! - `POST /start-crawl`: run a crawl request and return its report
//! - `GET /health`: liveness
//! - `GET /events`: server-sent progress events

mod routes;

use crate::crawler::RunController;
use crate::output::BroadcastSink;
use crate::HarvestError;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use routes::{ErrorBody, HealthResponse};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RunController>,
    /// Source of the `/events` stream; should also be part of the controller's sink
    pub events: BroadcastSink,
    /// Cancelled on server shutdown; every run gets a child token
    pub shutdown: CancellationToken,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/start-crawl", post(routes::start_crawl_handler))
        .route("/health", get(routes::health_handler))
        .route("/events", get(routes::events_handler))
        .with_state(state)
}

/// Serves the API on `addr` until `state.shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), HarvestError> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| HarvestError::Server(e.to_string()))
}
