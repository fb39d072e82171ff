//! HTTP trigger for load passes.
//!
//! - `GET|POST /v1/load?period=day` or `?start=YYYY/MM/DD&end=YYYY/MM/DD`
//! - `GET /health`

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use snafu::prelude::*;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AutoloaderError, ServeSnafu};
use crate::loader::Loader;
use crate::options::{LoadOptions, LoadParams};

/// Build the service router.
pub fn router(loader: Arc<Loader>) -> Router {
    Router::new()
        .route("/v1/load", get(load_handler).post(load_handler))
        .route("/health", get(health_handler))
        .with_state(loader)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    loader: Arc<Loader>,
    shutdown: CancellationToken,
) -> Result<(), AutoloaderError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Autoloader listening");
    }
    axum::serve(listener, router(loader))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context(ServeSnafu)
}

async fn load_handler(
    State(loader): State<Arc<Loader>>,
    Query(params): Query<LoadParams>,
) -> (StatusCode, String) {
    let options = match LoadOptions::from_params(&params, Utc::now().date_naive()) {
        Ok(options) => options,
        Err(e) => {
            warn!(error = %e, ?params, "Rejected load request");
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match loader.load(&options).await {
        Ok(_) => (StatusCode::OK, String::new()),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn health_handler() -> &'static str {
    "ok\n"
}
