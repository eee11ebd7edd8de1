use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use siteops_core::{ModelId, SubjectId};

use crate::dispatcher::InferenceDispatcher;
use crate::request::{InputData, PredictionRequest};
use crate::result::{AiError, PredictionValue};

/// Confidence below which a recommendation is flagged for manual review.
pub const MANUAL_REVIEW_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.95 {
            Urgency::Critical
        } else if confidence >= 0.85 {
            Urgency::High
        } else if confidence >= MANUAL_REVIEW_THRESHOLD {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub subject_id: SubjectId,
    pub model_id: ModelId,
    pub title: String,
    pub summary: String,
    pub value: PredictionValue,
    pub confidence: f64,
    pub urgency: Urgency,
    #[serde(default)]
    pub notes: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// A well-known model consulted for recommendations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationTarget {
    pub model_id: ModelId,
    pub title: String,
}

impl RecommendationTarget {
    pub fn new(model_id: impl Into<ModelId>, title: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            title: title.into(),
        }
    }
}

pub fn default_targets() -> Vec<RecommendationTarget> {
    vec![
        RecommendationTarget::new("cost-optimizer", "Cost optimization"),
        RecommendationTarget::new("schedule-predictor", "Schedule outlook"),
        RecommendationTarget::new("safety-risk", "Safety risk"),
    ]
}

/// Packages predictions from a fixed set of models into recommendations.
#[derive(Debug, Clone)]
pub struct Recommender {
    dispatcher: Arc<InferenceDispatcher>,
    targets: Vec<RecommendationTarget>,
}

impl Recommender {
    pub fn new(dispatcher: Arc<InferenceDispatcher>) -> Self {
        Self::with_targets(dispatcher, default_targets())
    }

    pub fn with_targets(dispatcher: Arc<InferenceDispatcher>, targets: Vec<RecommendationTarget>) -> Self {
        Self { dispatcher, targets }
    }

    /// Predict against every target with `context` as input, explanations on.
    ///
    /// Absent and not-ready models are skipped; other prediction errors are
    /// logged and skipped as well.
    pub fn generate(&self, subject: &SubjectId, context: &InputData) -> Vec<Recommendation> {
        let mut out = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let request = PredictionRequest::new(target.model_id.clone(), context.clone()).explained();
            match self.dispatcher.predict(&request) {
                Ok(result) => {
                    let mut notes = Vec::new();
                    if result.confidence < MANUAL_REVIEW_THRESHOLD {
                        notes.push(format!(
                            "Confidence {:.0}% is below {:.0}%; manual review recommended.",
                            result.confidence * 100.0,
                            MANUAL_REVIEW_THRESHOLD * 100.0
                        ));
                    }

                    out.push(Recommendation {
                        subject_id: subject.clone(),
                        model_id: target.model_id.clone(),
                        title: target.title.clone(),
                        summary: result.explanation.unwrap_or_else(|| result.value.to_string()),
                        value: result.value,
                        confidence: result.confidence,
                        urgency: Urgency::from_confidence(result.confidence),
                        notes,
                        generated_at: result.timestamp,
                    });
                }
                Err(AiError::ModelNotFound(_) | AiError::ModelNotReady { .. }) => {
                    debug!(subject = %subject, model = %target.model_id, "recommendation model unavailable");
                }
                Err(e) => {
                    warn!(subject = %subject, model = %target.model_id, error = %e, "recommendation skipped");
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Model, ModelCategory, ModelParameters, ModelStatus};
    use crate::registry::ModelRegistry;

    fn recommender() -> Recommender {
        let registry = ModelRegistry::arc();
        registry
            .register(
                Model::new(
                    "cost-optimizer",
                    "Cost optimizer",
                    ModelCategory::Optimization,
                    ModelParameters::regression(),
                )
                .with_status(ModelStatus::Ready)
                .with_accuracy(0.87),
            )
            .unwrap();
        registry
            .register(
                Model::new(
                    "safety-risk",
                    "Safety risk",
                    ModelCategory::Detection,
                    ModelParameters::Classification {
                        classes: vec!["low".into(), "high".into()],
                        weights: BTreeMap::new(),
                        bias: vec![],
                    },
                )
                .with_status(ModelStatus::Ready)
                .with_accuracy(0.5),
            )
            .unwrap();
        // schedule-predictor is absent.
        Recommender::new(Arc::new(InferenceDispatcher::local(registry)))
    }

    #[test]
    fn skips_absent_models_and_flags_low_confidence() {
        let context = InputData::new().with("material_costs", 1000.0).with("labor_rates", 500.0);
        let recs = recommender().generate(&SubjectId::from("project-1"), &context);

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].model_id, ModelId::from("cost-optimizer"));
        assert!(recs[0].notes.is_empty());
        assert_eq!(recs[0].urgency, Urgency::High);

        // blend(0.5, 0.5) = 0.5
        assert_eq!(recs[1].model_id, ModelId::from("safety-risk"));
        assert_eq!(recs[1].urgency, Urgency::Low);
        assert!(recs[1].notes[0].contains("manual review"));
        assert!(recs[1].summary.contains("Safety risk detected"));
    }

    #[test]
    fn urgency_bands() {
        assert_eq!(Urgency::from_confidence(0.99), Urgency::Critical);
        assert_eq!(Urgency::from_confidence(0.9), Urgency::High);
        assert_eq!(Urgency::from_confidence(0.7), Urgency::Medium);
        assert_eq!(Urgency::from_confidence(0.2), Urgency::Low);
    }
}
