use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use siteops_ai::{Model, PredictionRequest};
use siteops_core::{ModelId, SubjectId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/models", post(register_model).get(list_models))
        .route("/models/:id", get(get_model))
        .route("/models/:id/info", get(model_info))
        .route("/models/:id/status", post(change_status))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/predict/routed", post(predict_routed))
        .route("/recommendations/:subject", post(recommendations))
}

pub async fn register_model(
    Extension(services): Extension<Arc<AppServices>>,
    Json(model): Json<Model>,
) -> Response {
    let id = model.id.clone();
    if let Err(e) = services.registry.register(model) {
        return errors::ai_error_to_response(e);
    }

    match services.registry.get(&id) {
        Ok(model) => (StatusCode::CREATED, Json(model)).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

pub async fn list_models(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.registry.list())
}

pub async fn get_model(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id: ModelId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.registry.get(&id) {
        Ok(model) => Json(model).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

pub async fn model_info(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id: ModelId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.dispatcher.model_info(&id) {
        Ok(info) => Json(info).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> Response {
    let id: ModelId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.registry.transition(&id, body.status) {
        Ok(model) => Json(model).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

pub async fn predict(
    Extension(services): Extension<Arc<AppServices>>,
    Json(request): Json<PredictionRequest>,
) -> Response {
    match services.dispatcher.predict(&request) {
        Ok(result) => Json(result).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

/// Always 200; failures are reported per item.
pub async fn predict_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BatchPredictRequest>,
) -> Response {
    let results: Vec<dto::BatchItem> = services
        .dispatcher
        .predict_batch(&body.requests)
        .into_iter()
        .map(|outcome| match outcome {
            Ok(result) => dto::BatchItem::Ok { result },
            Err(e) => dto::BatchItem::Err {
                error: errors::ai_error_status(&e).1,
                message: e.to_string(),
            },
        })
        .collect();

    Json(serde_json::json!({ "results": results })).into_response()
}

pub async fn predict_routed(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RoutedPredictRequest>,
) -> Response {
    match services.dispatcher.predict_routed(&body.split, body.input_data, body.flags) {
        Ok(result) => Json(result).into_response(),
        Err(e) => errors::ai_error_to_response(e),
    }
}

pub async fn recommendations(
    Extension(services): Extension<Arc<AppServices>>,
    Path(subject): Path<String>,
    body: Option<Json<dto::RecommendationsRequest>>,
) -> Response {
    let subject: SubjectId = match errors::parse_id(&subject) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = body.unwrap_or_default();

    Json(services.recommender.generate(&subject, &body.context)).into_response()
}
