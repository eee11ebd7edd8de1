//! Periodic accuracy drift for `ready` models.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use siteops_ai::{AiError, Model, ModelRegistry, ModelStatus};
use siteops_core::ModelId;

/// Accuracy never rises above this through retraining.
pub const MAX_RETRAINED_ACCURACY: f64 = 0.99;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrainReport {
    pub retrained: Vec<ModelId>,
    pub failed: Vec<ModelId>,
}

/// Move every `ready` model through `updating` and back, nudging its accuracy
/// by at most `step` either way. Models that change status concurrently are
/// skipped; failures leave the model `ready`.
pub fn sweep<R: Rng>(registry: &ModelRegistry, step: f64, rng: &mut R) -> RetrainReport {
    sweep_with(registry, |model| {
        let delta = if step > 0.0 { rng.gen_range(-step..=step) } else { 0.0 };
        model.accuracy = (model.accuracy + delta).clamp(0.0, MAX_RETRAINED_ACCURACY);
        model.metrics.accuracy = model.accuracy;
        Ok(())
    })
}

/// [`sweep`] with a caller-supplied update step.
pub fn sweep_with<F>(registry: &ModelRegistry, mut update: F) -> RetrainReport
where
    F: FnMut(&mut Model) -> Result<(), AiError>,
{
    let mut report = RetrainReport::default();

    for id in registry.ids_with_status(ModelStatus::Ready) {
        match registry.retrain(&id, &mut update) {
            Ok(model) => {
                debug!(model = %id, accuracy = model.accuracy, "model retrained");
                report.retrained.push(id);
            }
            Err(e @ AiError::InvalidStatusTransition { to: ModelStatus::Updating, .. }) => {
                debug!(model = %id, error = %e, "model left ready before retraining; skipping");
            }
            Err(e) => {
                warn!(model = %id, error = %e, "retraining failed; model restored to ready");
                report.failed.push(id);
            }
        }
    }

    report
}
