use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use siteops_ai::{InputData, ModelStatus, PredictionFlags, PredictionRequest, PredictionResult, TrafficSplit};
use siteops_automation::SignalValue;
use siteops_core::SubjectId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: ModelStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsRequest {
    #[serde(default)]
    pub context: InputData,
}

#[derive(Debug, Deserialize)]
pub struct BatchPredictRequest {
    pub requests: Vec<PredictionRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RoutedPredictRequest {
    pub split: TrafficSplit,
    pub input_data: InputData,
    #[serde(default)]
    pub flags: PredictionFlags,
}

/// Field values merged into a subject's signals.
pub type SignalsRequest = HashMap<String, SignalValue>;

#[derive(Debug, Default, Deserialize)]
pub struct TickRequest {
    /// Subjects to evaluate; the scheduler's active subjects when absent.
    #[serde(default)]
    pub subjects: Option<Vec<SubjectId>>,
}

// -------------------------
// Response DTOs
// -------------------------

/// One entry of a batch response, in request order.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Ok { result: PredictionResult },
    Err { error: &'static str, message: String },
}
