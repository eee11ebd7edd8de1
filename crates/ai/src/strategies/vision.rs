use crate::model::{Model, ModelKind, ModelParameters};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::{blend, mismatch};

/// Thresholds per-label activations (features named after the labels) into a
/// detection list. Missing labels count as zero activation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputerVisionStrategy;

impl InferenceStrategy for ComputerVisionStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::ComputerVision
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::ComputerVision { labels, threshold } = &model.parameters else {
            return Err(mismatch(ModelKind::ComputerVision));
        };

        let activations: Vec<f64> = labels
            .iter()
            .map(|l| input.number(l).unwrap_or(0.0).clamp(0.0, 1.0))
            .collect();

        let detected: Vec<(String, f64)> = labels
            .iter()
            .zip(&activations)
            .filter(|(_, a)| **a >= *threshold)
            .map(|(l, a)| (l.clone(), *a))
            .collect();

        let total: f64 = activations.iter().sum();
        let probabilities = if total > 0.0 {
            activations.iter().map(|a| a / total).collect()
        } else {
            vec![1.0 / labels.len() as f64; labels.len()]
        };

        let certainty = if detected.is_empty() {
            1.0 - activations.iter().copied().fold(0.0, f64::max)
        } else {
            detected.iter().map(|(_, a)| a).sum::<f64>() / detected.len() as f64
        };

        let attributions = input
            .iter()
            .map(|(name, _)| {
                labels
                    .iter()
                    .position(|l| l == name)
                    .map_or(0.0, |i| activations[i])
            })
            .collect();

        Ok(Inference::new(
            PredictionValue::Labels(detected.into_iter().map(|(l, _)| l).collect()),
            blend(model.accuracy, certainty),
            probabilities,
        )
        .with_attributions(attributions))
    }
}
