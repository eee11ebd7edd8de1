use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
};

use siteops_core::SubjectId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/subjects/:id", post(activate_subject).delete(deactivate_subject))
        .route("/subjects/:id/signals", put(put_signals))
        .route("/ticks", post(run_tick))
}

fn subject_id(raw: &str) -> Result<SubjectId, Response> {
    errors::parse_id(raw)
}

pub async fn activate_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let status = if services.scheduler.add_subject(id.clone()).await {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(serde_json::json!({ "subject": id, "active": true }))).into_response()
}

/// Stops ticking the subject and forgets its signals.
pub async fn deactivate_subject(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if !services.scheduler.remove_subject(&id).await {
        return errors::json_error(StatusCode::NOT_FOUND, "subject_not_found", format!("subject not active: {id}"));
    }
    services.signals.clear(&id);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn put_signals(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(values): Json<dto::SignalsRequest>,
) -> Response {
    let id = match subject_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    services.signals.extend(&id, values);
    Json(services.signals.values(&id)).into_response()
}

pub async fn run_tick(
    Extension(services): Extension<Arc<AppServices>>,
    body: Option<Json<dto::TickRequest>>,
) -> Response {
    let Json(body) = body.unwrap_or_default();

    let report = match body.subjects {
        Some(subjects) => services.scheduler.engine().run_tick(&subjects).await,
        None => services.scheduler.tick_now().await,
    };
    Json(report).into_response()
}
