mod health;
mod metrics;
mod upload;

use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::services::ServeDir;

pub use upload::{UploadError, UploadResponse};

pub fn api_routes(upload_dir: &Path) -> Router<SharedState> {
    Router::new()
        .route("/upload", post(upload::upload_image))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .nest_service("/uploads", ServeDir::new(upload_dir))
}
