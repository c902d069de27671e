mod classify;
mod health;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use cattle_api::CLASSIFY_PATH;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route(CLASSIFY_PATH, post(classify::classify))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
