use crate::model::{Model, ModelKind, ModelParameters};
use crate::request::{FeatureValue, InputData};
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::{argmax, blend, mismatch, softmax};

/// Softmax classifier over numeric and one-hot categorical features.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassificationStrategy;

impl InferenceStrategy for ClassificationStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::Classification
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::Classification {
            classes,
            weights,
            bias,
        } = &model.parameters
        else {
            return Err(mismatch(ModelKind::Classification));
        };

        let mut logits = if bias.is_empty() {
            vec![0.0; classes.len()]
        } else {
            bias.clone()
        };

        // (weights row, activation) per input feature; attributed once the class is known.
        let mut contributions: Vec<Option<(&Vec<f64>, f64)>> = Vec::with_capacity(input.len());
        for (name, feature) in input.iter() {
            let hit = match feature {
                FeatureValue::Number(x) if x.is_finite() => weights.get(name).map(|w| (w, *x)),
                FeatureValue::Category(c) => weights.get(&format!("{name}={c}")).map(|w| (w, 1.0)),
                FeatureValue::Number(_) => None,
            };
            if let Some((row, x)) = hit {
                for (logit, w) in logits.iter_mut().zip(row) {
                    *logit += w * x;
                }
            }
            contributions.push(hit);
        }

        let probabilities = softmax(&logits);
        let best = argmax(&probabilities);
        let attributions = contributions
            .into_iter()
            .map(|c| c.map_or(0.0, |(row, x)| (row[best] * x).abs()))
            .collect();

        Ok(Inference::new(
            PredictionValue::Label(classes[best].clone()),
            blend(model.accuracy, probabilities[best]),
            probabilities,
        )
        .with_attributions(attributions))
    }
}
