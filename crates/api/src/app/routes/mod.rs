use axum::{Router, routing::get};

pub mod models;
pub mod rules;
pub mod subjects;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/inference/stats", get(system::inference_stats))
        .merge(models::router())
        .merge(rules::router())
        .merge(subjects::router())
}
