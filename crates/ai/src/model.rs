//! Model metadata, lifecycle and per-kind parameter schemas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::ModelId;

use crate::result::AiError;

/// Model family; selects the inference strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Regression,
    Classification,
    Clustering,
    DeepLearning,
    ComputerVision,
    Nlp,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        ModelKind::Regression,
        ModelKind::Classification,
        ModelKind::Clustering,
        ModelKind::DeepLearning,
        ModelKind::ComputerVision,
        ModelKind::Nlp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Regression => "regression",
            ModelKind::Classification => "classification",
            ModelKind::Clustering => "clustering",
            ModelKind::DeepLearning => "deep_learning",
            ModelKind::ComputerVision => "computer_vision",
            ModelKind::Nlp => "nlp",
        }
    }
}

impl core::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business purpose of a model; selects the explanation template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Predictive,
    Optimization,
    Recommendation,
    Detection,
    Automation,
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Ready,
    Updating,
    Deprecated,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Training => "training",
            ModelStatus::Ready => "ready",
            ModelStatus::Updating => "updating",
            ModelStatus::Deprecated => "deprecated",
        }
    }

    /// Allowed lifecycle edges:
    /// training→ready, ready→updating, updating→ready, non-deprecated→deprecated.
    pub fn can_transition_to(self, next: ModelStatus) -> bool {
        use ModelStatus::*;
        matches!(
            (self, next),
            (Training, Ready)
                | (Ready, Updating)
                | (Updating, Ready)
                | (Training | Ready | Updating, Deprecated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelStatus::Deprecated)
    }
}

impl core::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offline evaluation metrics (informational).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub latency_ms: f64,
    pub memory_mb: f64,
}

/// Fully-connected layer: `weights` is `outputs x inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    pub fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    pub fn outputs(&self) -> usize {
        self.weights.len()
    }
}

fn default_text_field() -> String {
    "text".to_string()
}

/// Closed per-kind parameter schema. The model kind is the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParameters {
    /// Linear model; features without a coefficient weigh 1.0.
    Regression {
        #[serde(default)]
        coefficients: BTreeMap<String, f64>,
        #[serde(default)]
        intercept: f64,
    },
    /// Softmax classifier. `weights[feature][class]`; categorical features
    /// are one-hot encoded as `"feature=value"` keys.
    Classification {
        classes: Vec<String>,
        #[serde(default)]
        weights: BTreeMap<String, Vec<f64>>,
        #[serde(default)]
        bias: Vec<f64>,
    },
    /// Nearest-centroid assignment over `features`.
    Clustering {
        features: Vec<String>,
        centroids: Vec<Vec<f64>>,
    },
    /// Feed-forward network with ReLU hidden layers and a single sigmoid output.
    DeepLearning {
        features: Vec<String>,
        layers: Vec<DenseLayer>,
    },
    /// Post-processing of per-label activations produced by a vision backbone.
    ComputerVision { labels: Vec<String>, threshold: f64 },
    /// Lexicon scorer over a free-text feature.
    Nlp {
        labels: Vec<String>,
        #[serde(default)]
        lexicon: BTreeMap<String, Vec<f64>>,
        #[serde(default = "default_text_field")]
        text_field: String,
    },
}

impl ModelParameters {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParameters::Regression { .. } => ModelKind::Regression,
            ModelParameters::Classification { .. } => ModelKind::Classification,
            ModelParameters::Clustering { .. } => ModelKind::Clustering,
            ModelParameters::DeepLearning { .. } => ModelKind::DeepLearning,
            ModelParameters::ComputerVision { .. } => ModelKind::ComputerVision,
            ModelParameters::Nlp { .. } => ModelKind::Nlp,
        }
    }

    /// Empty regression parameters (unit weights, zero intercept).
    pub fn regression() -> Self {
        ModelParameters::Regression {
            coefficients: BTreeMap::new(),
            intercept: 0.0,
        }
    }

    /// Structural validation; shapes must line up for inference to be total.
    pub fn validate(&self) -> Result<(), AiError> {
        match self {
            ModelParameters::Regression {
                coefficients,
                intercept,
            } => {
                if !intercept.is_finite() || coefficients.values().any(|c| !c.is_finite()) {
                    return Err(AiError::invalid_model("regression parameters must be finite"));
                }
            }
            ModelParameters::Classification {
                classes,
                weights,
                bias,
            } => {
                if classes.is_empty() {
                    return Err(AiError::invalid_model("classification needs at least one class"));
                }
                if !bias.is_empty() && bias.len() != classes.len() {
                    return Err(AiError::invalid_model("bias length must match class count"));
                }
                if let Some((feature, _)) = weights.iter().find(|(_, w)| w.len() != classes.len()) {
                    return Err(AiError::invalid_model(format!(
                        "weights for '{feature}' must have one entry per class"
                    )));
                }
            }
            ModelParameters::Clustering {
                features,
                centroids,
            } => {
                if features.is_empty() || centroids.is_empty() {
                    return Err(AiError::invalid_model("clustering needs features and centroids"));
                }
                if centroids.iter().any(|c| c.len() != features.len()) {
                    return Err(AiError::invalid_model("centroid dimension must match feature count"));
                }
            }
            ModelParameters::DeepLearning { features, layers } => {
                let Some(last) = layers.last() else {
                    return Err(AiError::invalid_model("network needs at least one layer"));
                };
                let mut width = features.len();
                for (i, layer) in layers.iter().enumerate() {
                    if layer.outputs() == 0 || layer.bias.len() != layer.outputs() {
                        return Err(AiError::invalid_model(format!(
                            "layer {i}: bias length must match output count"
                        )));
                    }
                    if layer.weights.iter().any(|row| row.len() != width) {
                        return Err(AiError::invalid_model(format!(
                            "layer {i}: expected {width} inputs per row"
                        )));
                    }
                    width = layer.outputs();
                }
                if last.outputs() != 1 {
                    return Err(AiError::invalid_model("final layer must have a single output"));
                }
            }
            ModelParameters::ComputerVision { labels, threshold } => {
                if labels.is_empty() {
                    return Err(AiError::invalid_model("vision model needs at least one label"));
                }
                if !(0.0..=1.0).contains(threshold) {
                    return Err(AiError::invalid_model("threshold must be within [0, 1]"));
                }
            }
            ModelParameters::Nlp {
                labels,
                lexicon,
                text_field,
            } => {
                if labels.is_empty() || text_field.is_empty() {
                    return Err(AiError::invalid_model("nlp model needs labels and a text field"));
                }
                if let Some((token, _)) = lexicon.iter().find(|(_, w)| w.len() != labels.len()) {
                    return Err(AiError::invalid_model(format!(
                        "lexicon entry '{token}' must have one weight per label"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_schema_version() -> u32 {
    1
}

/// A named, versioned predictive artifact with a lifecycle status.
///
/// Owned by the [`ModelRegistry`](crate::ModelRegistry); callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub category: ModelCategory,
    pub version: String,
    pub status: ModelStatus,
    pub accuracy: f64,
    #[serde(default)]
    pub metrics: ModelMetrics,
    pub parameters: ModelParameters,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Create a model in `training` status.
    pub fn new(
        id: impl Into<ModelId>,
        name: impl Into<String>,
        category: ModelCategory,
        parameters: ModelParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            category,
            version: "1.0.0".to_string(),
            status: ModelStatus::Training,
            accuracy: 0.0,
            metrics: ModelMetrics::default(),
            parameters,
            schema_version: default_schema_version(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ModelStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self.metrics.accuracy = accuracy;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.parameters.kind()
    }

    pub fn is_ready(&self) -> bool {
        self.status == ModelStatus::Ready
    }

    pub fn validate(&self) -> Result<(), AiError> {
        if self.id.as_str().trim().is_empty() {
            return Err(AiError::invalid_model("model id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(AiError::invalid_model(format!(
                "accuracy {} is outside [0, 1]",
                self.accuracy
            )));
        }
        self.parameters.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_edges() {
        use ModelStatus::*;
        assert!(Training.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Updating));
        assert!(Updating.can_transition_to(Ready));
        assert!(Training.can_transition_to(Deprecated));
        assert!(Updating.can_transition_to(Deprecated));

        assert!(!Training.can_transition_to(Updating));
        assert!(!Ready.can_transition_to(Training));
        assert!(!Ready.can_transition_to(Ready));
        assert!(!Deprecated.can_transition_to(Ready));
        assert!(!Deprecated.can_transition_to(Deprecated));
    }

    #[test]
    fn kind_follows_parameters() {
        let model = Model::new(
            "defects",
            "Defect detector",
            ModelCategory::Detection,
            ModelParameters::ComputerVision {
                labels: vec!["crack".into()],
                threshold: 0.5,
            },
        );
        assert_eq!(model.kind(), ModelKind::ComputerVision);
        assert_eq!(model.status, ModelStatus::Training);
    }

    #[test]
    fn accuracy_out_of_range_is_rejected() {
        let model = Model::new("m", "m", ModelCategory::Predictive, ModelParameters::regression())
            .with_accuracy(1.2);
        assert!(matches!(model.validate(), Err(AiError::InvalidModel(_))));
    }

    #[test]
    fn network_shapes_are_checked() {
        let params = ModelParameters::DeepLearning {
            features: vec!["a".into(), "b".into()],
            layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0, 1.0], vec![0.5, -0.5]],
                    bias: vec![0.0, 0.0],
                },
                DenseLayer {
                    weights: vec![vec![1.0, 1.0, 1.0]],
                    bias: vec![0.0],
                },
            ],
        };
        assert!(matches!(params.validate(), Err(AiError::InvalidModel(msg)) if msg.contains("layer 1")));
    }

    #[test]
    fn parameters_round_trip_with_kind_tag() {
        let json = serde_json::json!({
            "kind": "nlp",
            "labels": ["negative", "positive"],
            "lexicon": {"delay": [1.0, 0.0]}
        });
        let params: ModelParameters = serde_json::from_value(json).unwrap();
        match &params {
            ModelParameters::Nlp { text_field, .. } => assert_eq!(text_field, "text"),
            other => panic!("unexpected parameters: {other:?}"),
        }
        assert_eq!(params.kind(), ModelKind::Nlp);
        assert!(params.validate().is_ok());
    }
}
