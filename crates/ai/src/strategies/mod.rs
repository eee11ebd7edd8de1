//! Reference inference strategies, one per model kind.
//!
//! These are deterministic and dependency-free so the dispatcher contract can
//! be exercised end to end. Production deployments register their own
//! [`InferenceStrategy`] implementations for the kinds they serve.

mod classification;
mod clustering;
mod deep_learning;
mod nlp;
mod regression;
mod vision;

use std::sync::Arc;

pub use classification::ClassificationStrategy;
pub use clustering::ClusteringStrategy;
pub use deep_learning::DeepLearningStrategy;
pub use nlp::NlpStrategy;
pub use regression::RegressionStrategy;
pub use vision::ComputerVisionStrategy;

use crate::model::ModelKind;
use crate::request::InputData;
use crate::result::AiError;
use crate::strategy::InferenceStrategy;

/// All six reference strategies.
pub fn builtin() -> Vec<Arc<dyn InferenceStrategy>> {
    vec![
        Arc::new(RegressionStrategy),
        Arc::new(ClassificationStrategy),
        Arc::new(ClusteringStrategy),
        Arc::new(DeepLearningStrategy),
        Arc::new(ComputerVisionStrategy),
        Arc::new(NlpStrategy),
    ]
}

/// Numerically stable softmax.
pub(crate) fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Dense vector of `features` from the input; every feature must be numeric.
pub(crate) fn feature_vector(input: &InputData, features: &[String]) -> Result<Vec<f64>, AiError> {
    features
        .iter()
        .map(|name| {
            input
                .number(name)
                .ok_or_else(|| AiError::invalid_input(format!("missing numeric feature '{name}'")))
        })
        .collect()
}

/// Blend the model's offline accuracy with per-request certainty.
pub(crate) fn blend(accuracy: f64, certainty: f64) -> f64 {
    ((accuracy + certainty) / 2.0).clamp(0.0, 0.99)
}

pub(crate) fn mismatch(expected: ModelKind) -> AiError {
    AiError::inference_failed(format!("model parameters are not {expected} parameters"))
}
