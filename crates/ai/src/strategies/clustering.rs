use crate::model::{Model, ModelKind, ModelParameters};
use crate::request::InputData;
use crate::result::{AiError, PredictionValue};
use crate::strategy::{Inference, InferenceStrategy};

use super::{argmax, blend, feature_vector, mismatch, softmax};

/// Nearest-centroid assignment; membership probabilities are a softmax over
/// negative Euclidean distances.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusteringStrategy;

impl InferenceStrategy for ClusteringStrategy {
    fn kind(&self) -> ModelKind {
        ModelKind::Clustering
    }

    fn infer(&self, model: &Model, input: &InputData) -> Result<Inference, AiError> {
        let ModelParameters::Clustering {
            features,
            centroids,
        } = &model.parameters
        else {
            return Err(mismatch(ModelKind::Clustering));
        };

        let x = feature_vector(input, features)?;
        let neg_distances: Vec<f64> = centroids
            .iter()
            .map(|c| {
                -c.iter()
                    .zip(&x)
                    .map(|(ci, xi)| (ci - xi).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();

        let probabilities = softmax(&neg_distances);
        let cluster = argmax(&probabilities);

        Ok(Inference::new(
            PredictionValue::Cluster(cluster),
            blend(model.accuracy, probabilities[cluster]),
            probabilities,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCategory;

    #[test]
    fn assigns_nearest_centroid() {
        let model = Model::new(
            "crew-segments",
            "Crew segments",
            ModelCategory::Recommendation,
            ModelParameters::Clustering {
                features: vec!["hours".into(), "output".into()],
                centroids: vec![vec![0.0, 0.0], vec![10.0, 10.0]],
            },
        )
        .with_accuracy(0.7);

        let input = InputData::new().with("output", 9.0).with("hours", 11.0);
        let out = ClusteringStrategy.infer(&model, &input).unwrap();
        assert_eq!(out.value, PredictionValue::Cluster(1));
        assert!(out.probabilities[1] > 0.99);
    }
}
