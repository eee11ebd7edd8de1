use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use siteops_core::ModelId;

use crate::model::{ModelKind, ModelStatus};

/// Predicted value; its shape depends on the model kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PredictionValue {
    /// Regression estimate or deep-learning score.
    Number(f64),
    /// Classification / NLP label.
    Label(String),
    /// Clustering assignment.
    Cluster(usize),
    /// Computer-vision detections (possibly empty).
    Labels(Vec<String>),
}

impl core::fmt::Display for PredictionValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PredictionValue::Number(v) => write!(f, "{v:.2}"),
            PredictionValue::Label(l) => f.write_str(l),
            PredictionValue::Cluster(c) => write!(f, "cluster {c}"),
            PredictionValue::Labels(ls) if ls.is_empty() => f.write_str("no findings"),
            PredictionValue::Labels(ls) => f.write_str(&ls.join(", ")),
        }
    }
}

/// Direction of a feature's influence, derived from its importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Positive,
    Neutral,
    Negative,
}

impl Impact {
    /// `>= 0.6` positive, `>= 0.3` neutral, otherwise negative.
    pub fn from_importance(importance: f64) -> Self {
        if importance >= 0.6 {
            Impact::Positive
        } else if importance >= 0.3 {
            Impact::Neutral
        } else {
            Impact::Negative
        }
    }
}

/// Per-feature contribution to a prediction. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    pub impact: Impact,
    pub description: String,
}

/// Result of an inference. Produced once by the dispatcher, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub model_id: ModelId,
    pub value: PredictionValue,
    /// Always within \[0, 0.99\].
    pub confidence: f64,
    /// Sums to 1 (± 1e-6).
    pub probabilities: Vec<f64>,
    pub explanation: Option<String>,
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub latency_ms: f64,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

/// Registry and inference failures surfaced to callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AiError {
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("model {id} is not ready (status: {status})")]
    ModelNotReady { id: ModelId, status: ModelStatus },

    #[error("duplicate model id: {0}")]
    DuplicateModelId(ModelId),

    #[error("invalid status transition for model {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: ModelId,
        from: ModelStatus,
        to: ModelStatus,
    },

    #[error("unsupported model kind: {0}")]
    UnsupportedModelKind(ModelKind),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

impl AiError {
    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inference_failed(msg: impl Into<String>) -> Self {
        Self::InferenceFailed(msg.into())
    }
}
