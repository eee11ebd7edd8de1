use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use siteops_ai::AiError;
use siteops_automation::RuleStoreError;

pub fn ai_error_to_response(err: AiError) -> Response {
    let (status, code) = ai_error_status(&err);
    json_error(status, code, err.to_string())
}

/// HTTP status and machine-readable code for an inference error.
pub fn ai_error_status(err: &AiError) -> (StatusCode, &'static str) {
    match err {
        AiError::ModelNotFound(_) => (StatusCode::NOT_FOUND, "model_not_found"),
        AiError::DuplicateModelId(_) => (StatusCode::CONFLICT, "duplicate_model"),
        AiError::ModelNotReady { .. } => (StatusCode::CONFLICT, "model_not_ready"),
        AiError::InvalidStatusTransition { .. } => (StatusCode::CONFLICT, "invalid_status_transition"),
        AiError::UnsupportedModelKind(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_model_kind"),
        AiError::InvalidModel(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_model"),
        AiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        AiError::InferenceFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inference_failed"),
    }
}

pub fn rule_store_error_to_response(err: RuleStoreError) -> Response {
    let message = err.to_string();
    match err {
        RuleStoreError::RuleNotFound(_) => json_error(StatusCode::NOT_FOUND, "rule_not_found", message),
        RuleStoreError::DuplicateRuleId(_) => json_error(StatusCode::CONFLICT, "duplicate_rule", message),
        RuleStoreError::InvalidRule { .. } => json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_rule", message),
        RuleStoreError::Storage(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into one of the core id types.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
