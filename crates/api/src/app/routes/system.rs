use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn inference_stats(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let stats = services.dispatcher.stats();
    Json(serde_json::json!({
        "total_inferences": stats.total_inferences,
        "failures": stats.failures,
        "mean_latency_ms": stats.mean_latency_ms(),
        "cache_enabled": services.dispatcher.cache_len().is_some(),
        "cache_size": services.dispatcher.cache_len().unwrap_or(0),
        "cache_hits": stats.cache_hits,
        "cache_misses": stats.cache_misses,
        "cache_hit_rate": stats.cache_hit_rate(),
        "models_registered": services.registry.len(),
        "scheduler_running": services.scheduler.is_running(),
    }))
}
