use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use siteops_automation::{AutomationRule, RulePatch};
use siteops_core::RuleId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/rules", post(create_rule).get(list_rules))
        .route("/rules/:id", get(get_rule).patch(update_rule).delete(delete_rule))
        .route("/rules/:id/reset", post(reset_success_rate))
}

fn rule_id(raw: &str) -> Result<RuleId, Response> {
    errors::parse_id(raw)
}

pub async fn create_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Json(rule): Json<AutomationRule>,
) -> Response {
    match services.rules.add(rule) {
        Ok(rule) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}

pub async fn list_rules(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.rules.list() {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}

pub async fn get_rule(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id = match rule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rules.get(&id) {
        Ok(rule) => Json(rule).into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}

pub async fn update_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(patch): Json<RulePatch>,
) -> Response {
    let id = match rule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rules.update(&id, patch) {
        Ok(rule) => Json(rule).into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}

pub async fn delete_rule(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> Response {
    let id = match rule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rules.remove(&id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}

pub async fn reset_success_rate(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match rule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rules.reset_success_rate(&id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::rule_store_error_to_response(e),
    }
}
