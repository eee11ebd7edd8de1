use crate::model::{Model, ModelKind};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};

/// Raw output of an inference strategy, before the dispatcher enforces the
/// result contract (confidence clamp, probability normalization).
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub value: PredictionValue,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    /// Optional per-feature attributions, aligned with the input order.
    /// Any non-negative scale; the explainability generator normalizes them.
    pub attributions: Option<Vec<f64>>,
}

impl Inference {
    pub fn new(value: PredictionValue, confidence: f64, probabilities: Vec<f64>) -> Self {
        Self {
            value,
            confidence,
            probabilities,
            attributions: None,
        }
    }

    pub fn with_attributions(mut self, attributions: Vec<f64>) -> Self {
        self.attributions = Some(attributions);
        self
    }
}

/// A kind-specific inference backend.
///
/// Implementations must be pure: same model and input, same output. They
/// receive a snapshot of the model and must not retain it.
pub trait InferenceStrategy: Send + Sync + 'static {
    /// The model kind this strategy serves.
    fn kind(&self) -> ModelKind;

    /// Turn input features into a value, confidence and probability distribution.
    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError>;
}
