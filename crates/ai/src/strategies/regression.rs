use crate::model::{Model, ModelKind, ModelParameters};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::mismatch;

/// Linear regression: `intercept + sum(coefficient * feature)`.
///
/// Confidence starts at the model accuracy and gains up to 0.1 with the share
/// of usable (finite numeric) features in the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegressionStrategy;

impl InferenceStrategy for RegressionStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::Regression
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::Regression {
            coefficients,
            intercept,
        } = &model.parameters
        else {
            return Err(mismatch(ModelKind::Regression));
        };

        let mut value = *intercept;
        let mut usable = 0usize;
        let mut attributions = Vec::with_capacity(input.len());

        for (name, feature) in input.iter() {
            match feature.as_f64() {
                Some(x) => {
                    let coefficient = coefficients.get(name).copied().unwrap_or(1.0);
                    value += coefficient * x;
                    usable += 1;
                    attributions.push((coefficient * x).abs());
                }
                None => attributions.push(0.0),
            }
        }

        let support = if input.is_empty() {
            0.0
        } else {
            usable as f64 / input.len() as f64
        };
        let confidence = (model.accuracy + 0.1 * support).clamp(0.0, 0.99);

        Ok(Inference::new(
            PredictionValue::Number(value),
            confidence,
            vec![confidence, 1.0 - confidence],
        )
        .with_attributions(attributions))
    }
}
