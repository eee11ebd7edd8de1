//! Weighted traffic splitting across model variants.

use rand::Rng;
use serde::{Deserialize, Serialize};

use siteops_core::ModelId;

use crate::result::AiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRoute {
    pub model_id: ModelId,
    /// Relative share of traffic; routes need not sum to 100.
    pub weight: f64,
}

/// Ordered routes for one logical model, e.g. a champion and a challenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSplit {
    pub routes: Vec<TrafficRoute>,
}

impl TrafficSplit {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn with_route(mut self, model_id: impl Into<ModelId>, weight: f64) -> Self {
        self.routes.push(TrafficRoute {
            model_id: model_id.into(),
            weight,
        });
        self
    }

    pub fn validate(&self) -> Result<(), AiError> {
        if self.routes.is_empty() {
            return Err(AiError::invalid_input("traffic split has no routes"));
        }
        if let Some(route) = self.routes.iter().find(|r| !r.weight.is_finite() || r.weight < 0.0) {
            return Err(AiError::invalid_input(format!(
                "route to {} has invalid weight {}",
                route.model_id, route.weight
            )));
        }
        Ok(())
    }

    /// Route for `roll` in `[0, 1)`. With no positive weight, the first route wins.
    pub fn pick(&self, roll: f64) -> Result<&ModelId, AiError> {
        self.validate()?;

        let total: f64 = self.routes.iter().map(|r| r.weight).sum();
        let first = &self.routes[0].model_id;
        if total <= 0.0 {
            return Ok(first);
        }

        let target = roll.clamp(0.0, 1.0) * total;
        let mut cumulative = 0.0;
        for route in self.routes.iter().filter(|r| r.weight > 0.0) {
            cumulative += route.weight;
            if target < cumulative {
                return Ok(&route.model_id);
            }
        }
        Ok(self
            .routes
            .iter()
            .rev()
            .find(|r| r.weight > 0.0)
            .map_or(first, |r| &r.model_id))
    }

    pub fn route<R: Rng>(&self, rng: &mut R) -> Result<&ModelId, AiError> {
        self.pick(rng.r#gen::<f64>())
    }
}

impl Default for TrafficSplit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn split() -> TrafficSplit {
        TrafficSplit::new().with_route("champion", 90.0).with_route("challenger", 10.0)
    }

    #[test]
    fn rolls_map_onto_cumulative_weights() {
        let split = split();
        assert_eq!(split.pick(0.0).unwrap().as_str(), "champion");
        assert_eq!(split.pick(0.89).unwrap().as_str(), "champion");
        assert_eq!(split.pick(0.9).unwrap().as_str(), "challenger");
        assert_eq!(split.pick(1.0).unwrap().as_str(), "challenger");
    }

    #[test]
    fn zero_weights_fall_back_to_first_route() {
        let split = TrafficSplit::new().with_route("a", 0.0).with_route("b", 0.0);
        assert_eq!(split.pick(0.7).unwrap().as_str(), "a");

        let split = TrafficSplit::new().with_route("a", 0.0).with_route("b", 1.0);
        assert_eq!(split.pick(0.0).unwrap().as_str(), "b");
    }

    #[test]
    fn invalid_splits_are_rejected() {
        assert!(matches!(TrafficSplit::new().pick(0.5), Err(AiError::InvalidInput(_))));
        assert!(TrafficSplit::new().with_route("a", -1.0).validate().is_err());
        assert!(TrafficSplit::new().with_route("a", f64::NAN).validate().is_err());
    }

    #[test]
    fn traffic_follows_weights() {
        let split = split();
        let mut rng = StdRng::seed_from_u64(11);
        let challenger = (0..10_000)
            .filter(|_| split.route(&mut rng).unwrap().as_str() == "challenger")
            .count();
        assert!((700..=1300).contains(&challenger), "challenger got {challenger}");
    }
}
