//! Human-readable explanations and per-feature importances.
//!
//! Nothing here can fail: degenerate inputs yield an empty importance list and
//! a generic sentence.

use crate::model::{Model, ModelCategory};
use crate::request::{FeatureValue, InputData};
use crate::result::{FeatureImportance, Impact, PredictionResult};

/// Importance assigned to categorical features when no attributions exist.
const CATEGORICAL_IMPORTANCE: f64 = 0.5;

/// Fill `explanation` and `feature_importance` on a fresh result.
pub fn enrich(model: &Model, input: &InputData, attributions: Option<&[f64]>, result: &mut PredictionResult) {
    result.explanation = Some(explanation(model, result));
    result.feature_importance = Some(feature_importance(input, attributions));
}

/// One sentence, chosen by model category.
pub fn explanation(model: &Model, result: &PredictionResult) -> String {
    let name = &model.name;
    let value = &result.value;
    let pct = (result.confidence * 100.0).round();

    match model.category {
        ModelCategory::Predictive => {
            format!("Based on historical patterns, {name} predicts {value} with {pct}% confidence.")
        }
        ModelCategory::Optimization => {
            format!("{name} recommends {value} as the optimal outcome ({pct}% confidence).")
        }
        ModelCategory::Detection => format!("{name} detected {value} with {pct}% confidence."),
        ModelCategory::Recommendation => {
            format!("{name} suggests {value} based on similar past projects ({pct}% confidence).")
        }
        ModelCategory::Automation => format!("{name} produced {value} with {pct}% confidence."),
    }
}

/// One entry per input feature, sorted by importance descending; ties keep
/// input order.
///
/// Uses `attributions` when they line up with the input, otherwise falls back
/// to each numeric feature's magnitude relative to the largest one.
pub fn feature_importance(input: &InputData, attributions: Option<&[f64]>) -> Vec<FeatureImportance> {
    let raw: Vec<f64> = match attributions {
        Some(a) if a.len() == input.len() => normalize(a.iter().map(|v| v.abs()).collect()),
        _ => magnitudes(input),
    };

    let mut importances: Vec<FeatureImportance> = input
        .iter()
        .zip(raw)
        .map(|((feature, _), importance)| {
            let impact = Impact::from_importance(importance);
            FeatureImportance {
                feature: feature.to_string(),
                importance,
                impact,
                description: describe(feature, impact),
            }
        })
        .collect();

    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    importances
}

fn magnitudes(input: &InputData) -> Vec<f64> {
    let numeric: Vec<Option<f64>> = input.iter().map(|(_, v)| v.as_f64().map(f64::abs)).collect();
    let max = numeric.iter().flatten().copied().fold(0.0, f64::max);

    input
        .iter()
        .zip(numeric)
        .map(|((_, value), magnitude)| match (value, magnitude) {
            (FeatureValue::Category(_), _) => CATEGORICAL_IMPORTANCE,
            (_, Some(m)) if max > 0.0 => m / max,
            _ => 0.0,
        })
        .collect()
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    values
        .into_iter()
        .map(|v| if max > 0.0 && v.is_finite() { v / max } else { 0.0 })
        .collect()
}

fn describe(feature: &str, impact: Impact) -> String {
    match impact {
        Impact::Positive => format!("{feature} strongly drives this prediction"),
        Impact::Neutral => format!("{feature} has a moderate effect on this prediction"),
        Impact::Negative => format!("{feature} has limited influence on this prediction"),
    }
}
