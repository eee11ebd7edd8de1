use crate::model::{DenseLayer, Model, ModelKind, ModelParameters};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::{blend, feature_vector, mismatch, sigmoid};

/// Feed-forward network: ReLU hidden layers, sigmoid on the single output.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepLearningStrategy;

fn forward(layer: &DenseLayer, input: &[f64]) -> Vec<f64> {
    layer
        .weights
        .iter()
        .zip(&layer.bias)
        .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
        .collect()
}

impl InferenceStrategy for DeepLearningStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::DeepLearning
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::DeepLearning { features, layers } = &model.parameters else {
            return Err(mismatch(ModelKind::DeepLearning));
        };

        let mut activations = feature_vector(input, features)?;
        let hidden = layers.len().saturating_sub(1);
        for layer in &layers[..hidden] {
            activations = forward(layer, &activations)
                .into_iter()
                .map(|z| z.max(0.0))
                .collect();
        }
        let output = layers
            .last()
            .map(|l| forward(l, &activations))
            .and_then(|o| o.first().copied())
            .ok_or_else(|| AiError::inference_failed("network produced no output"))?;

        let score = sigmoid(output);
        if !score.is_finite() {
            return Err(AiError::inference_failed("network output is not finite"));
        }

        Ok(Inference::new(
            PredictionValue::Number(score),
            blend(model.accuracy, score.max(1.0 - score)),
            vec![score, 1.0 - score],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCategory;

    #[test]
    fn relu_hidden_then_sigmoid_output() {
        let model = Model::new(
            "schedule-predictor",
            "Schedule",
            ModelCategory::Predictive,
            ModelParameters::DeepLearning {
                features: vec!["delay_days".into()],
                layers: vec![
                    DenseLayer {
                        weights: vec![vec![1.0], vec![-1.0]],
                        bias: vec![0.0, 0.0],
                    },
                    DenseLayer {
                        weights: vec![vec![1.0, 1.0]],
                        bias: vec![0.0],
                    },
                ],
            },
        )
        .with_accuracy(0.9);

        // hidden = relu([-2, 2]) = [0, 2]; output = 2
        let out = DeepLearningStrategy
            .infer(&model, &InputData::new().with("delay_days", -2.0))
            .unwrap();
        match out.value {
            PredictionValue::Number(score) => assert!((score - sigmoid(2.0)).abs() < 1e-12),
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
