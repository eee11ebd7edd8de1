use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use siteops_core::ModelId;
use siteops_observability::{TelemetrySink, TracingTelemetrySink, tags};

use crate::cache::{CacheKey, PredictionCache};
use crate::explain;
use crate::model::{Model, ModelCategory, ModelKind, ModelStatus};
use crate::registry::ModelRegistry;
use crate::request::{InputData, PredictionFlags, PredictionRequest};
use crate::result::{AiError, PredictionResult, PredictionValue};
use crate::routing::TrafficSplit;
use crate::strategies;
use crate::strategy::{Inference, InferenceStrategy};

pub const INFERENCE_LATENCY_METRIC: &str = "inference.latency";

/// Upper bound on reported confidence.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Running inference counters. Cache counters stay at zero unless the
/// dispatcher was built with a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub failures: u64,
    pub total_latency_ms: f64,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub cache_misses: u64,
}

impl InferenceStats {
    pub fn mean_latency_ms(&self) -> f64 {
        if self.total_inferences == 0 {
            0.0
        } else {
            self.total_latency_ms / self.total_inferences as f64
        }
    }

    /// Hits over lookups; 0 before the first lookup.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Serving view of a registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: String,
    pub category: ModelCategory,
    pub kind: ModelKind,
    pub version: String,
    pub status: ModelStatus,
    pub accuracy: f64,
    /// Ready and backed by a registered strategy.
    pub servable: bool,
}

/// Routes prediction requests to the strategy registered for the model's kind
/// and enforces the result contract on whatever the strategy returns.
pub struct InferenceDispatcher {
    registry: Arc<ModelRegistry>,
    strategies: HashMap<ModelKind, Arc<dyn InferenceStrategy>>,
    telemetry: Arc<dyn TelemetrySink>,
    stats: Mutex<InferenceStats>,
    cache: Option<Mutex<PredictionCache>>,
}

impl std::fmt::Debug for InferenceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().collect();
        kinds.sort();
        f.debug_struct("InferenceDispatcher")
            .field("kinds", &kinds)
            .field("stats", &self.stats())
            .field("cached", &self.cache_len())
            .finish()
    }
}

impl InferenceDispatcher {
    /// A dispatcher with no strategies; every kind is unsupported until registered.
    pub fn new(registry: Arc<ModelRegistry>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            registry,
            strategies: HashMap::new(),
            telemetry,
            stats: Mutex::new(InferenceStats::default()),
            cache: None,
        }
    }

    /// A dispatcher serving every kind with the reference strategies.
    pub fn with_builtin_strategies(registry: Arc<ModelRegistry>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        strategies::builtin()
            .into_iter()
            .fold(Self::new(registry, telemetry), |d, s| d.with_strategy(s))
    }

    /// Dispatcher with reference strategies that reports telemetry through `tracing`.
    pub fn local(registry: Arc<ModelRegistry>) -> Self {
        Self::with_builtin_strategies(registry, Arc::new(TracingTelemetrySink))
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn InferenceStrategy>) -> Self {
        self.register_strategy(strategy);
        self
    }

    /// Serve repeated requests from a cache of at most `capacity` results,
    /// each kept for `ttl`.
    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache = Some(Mutex::new(PredictionCache::new(capacity, ttl)));
        self
    }

    /// Cached results, or `None` when caching is off.
    pub fn cache_len(&self) -> Option<usize> {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|e| e.into_inner()).len())
    }

    /// Install (or replace) the strategy for its kind.
    pub fn register_strategy(&mut self, strategy: Arc<dyn InferenceStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> InferenceStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn model_info(&self, id: &ModelId) -> Result<ModelInfo, AiError> {
        let model = self.registry.get(id)?;
        let kind = model.kind();
        Ok(ModelInfo {
            servable: model.is_ready() && self.strategies.contains_key(&kind),
            kind,
            id: model.id,
            name: model.name,
            category: model.category,
            version: model.version,
            status: model.status,
            accuracy: model.accuracy,
        })
    }

    /// Run a prediction against a `ready` model.
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, AiError> {
        let started = Instant::now();
        let outcome = self.predict_inner(request, started);

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        match &outcome {
            Ok((result, hit)) => {
                stats.total_inferences += 1;
                stats.total_latency_ms += result.latency_ms;
                match hit {
                    Some(true) => stats.cache_hits += 1,
                    Some(false) => stats.cache_misses += 1,
                    None => {}
                }
            }
            Err(e) => {
                stats.failures += 1;
                warn!(model = %request.model_id, error = %e, "inference failed");
            }
        }
        outcome.map(|(result, _)| result)
    }

    /// Each request independently, results in request order.
    pub fn predict_batch(&self, requests: &[PredictionRequest]) -> Vec<Result<PredictionResult, AiError>> {
        debug!(requests = requests.len(), "batch inference");
        requests.iter().map(|r| self.predict(r)).collect()
    }

    /// Pick a model from `split` for the next request.
    pub fn route_request(&self, split: &TrafficSplit) -> Result<ModelId, AiError> {
        let id = split.route(&mut rand::thread_rng())?.clone();
        debug!(model = %id, routes = split.routes.len(), "request routed");
        Ok(id)
    }

    /// [`route_request`](Self::route_request) then [`predict`](Self::predict)
    /// against the chosen model.
    pub fn predict_routed(
        &self,
        split: &TrafficSplit,
        input_data: InputData,
        flags: PredictionFlags,
    ) -> Result<PredictionResult, AiError> {
        let model_id = self.route_request(split)?;
        self.predict(&PredictionRequest {
            model_id,
            input_data,
            flags,
        })
    }

    /// The result and, when caching is on, whether it came from the cache.
    fn predict_inner(
        &self,
        request: &PredictionRequest,
        started: Instant,
    ) -> Result<(PredictionResult, Option<bool>), AiError> {
        let model = self.registry.get(&request.model_id)?;
        if !model.is_ready() {
            return Err(AiError::ModelNotReady {
                id: model.id,
                status: model.status,
            });
        }

        let Some(cache) = &self.cache else {
            return Ok((self.infer(&model, request, started)?, None));
        };

        let key = CacheKey::new(request, &model.version);
        let cached = cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key);
        if let Some(mut result) = cached {
            result.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            debug!(model = %model.id, "inference served from cache");
            return Ok((result, Some(true)));
        }

        let result = self.infer(&model, request, started)?;
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, result.clone());
        Ok((result, Some(false)))
    }

    fn infer(&self, model: &Model, request: &PredictionRequest, started: Instant) -> Result<PredictionResult, AiError> {
        let kind = model.kind();
        let strategy = self
            .strategies
            .get(&kind)
            .ok_or(AiError::UnsupportedModelKind(kind))?;

        let inference = strategy.infer(model, &request.input_data)?;
        let attributions = inference.attributions.clone();
        let (value, confidence, probabilities) = enforce_contract(inference)?;

        let mut result = PredictionResult {
            model_id: model.id.clone(),
            value,
            confidence,
            probabilities,
            explanation: None,
            feature_importance: None,
            latency_ms: 0.0,
            model_version: model.version.clone(),
            timestamp: Utc::now(),
        };

        if request.flags.explain {
            explain::enrich(model, &request.input_data, attributions.as_deref(), &mut result);
        }

        result.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.emit_latency(model, &result, request.flags.real_time);
        Ok(result)
    }

    fn emit_latency(&self, model: &Model, result: &PredictionResult, real_time: bool) {
        debug!(
            model = %model.id,
            kind = %model.kind(),
            confidence = result.confidence,
            latency_ms = result.latency_ms,
            "inference complete"
        );
        self.telemetry.record(
            INFERENCE_LATENCY_METRIC,
            result.latency_ms,
            "ms",
            tags([
                ("model_id", model.id.to_string()),
                ("confidence", format!("{:.4}", result.confidence)),
                ("kind", model.kind().to_string()),
                ("real_time", real_time.to_string()),
            ]),
        );
    }
}

/// Clamp confidence and normalize the distribution; reject outputs that cannot be repaired.
fn enforce_contract(inference: Inference) -> Result<(PredictionValue, f64, Vec<f64>), AiError> {
    let Inference {
        value,
        confidence,
        probabilities,
        ..
    } = inference;

    if confidence.is_nan() {
        return Err(AiError::inference_failed("strategy returned NaN confidence"));
    }
    if probabilities.is_empty() {
        return Err(AiError::inference_failed("strategy returned no probabilities"));
    }
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(AiError::inference_failed(
            "strategy returned negative or non-finite probabilities",
        ));
    }
    let sum: f64 = probabilities.iter().sum();
    if sum <= 0.0 {
        return Err(AiError::inference_failed("strategy returned an all-zero distribution"));
    }

    Ok((
        value,
        confidence.clamp(0.0, MAX_CONFIDENCE),
        probabilities.into_iter().map(|p| p / sum).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use siteops_observability::InMemoryTelemetrySink;

    use super::*;
    use crate::model::ModelParameters;

    struct Fixed(Inference);

    impl InferenceStrategy for Fixed {
        fn kind(&self) -> ModelKind {
            ModelKind::Regression
        }

        fn infer(&self, _: &Model, _: &InputData) -> Result<Inference, AiError> {
            Ok(self.0.clone())
        }
    }

    fn setup(status: ModelStatus) -> (InferenceDispatcher, Arc<InMemoryTelemetrySink>) {
        let registry = ModelRegistry::arc();
        registry
            .register(
                Model::new(
                    "cost-optimizer",
                    "Cost optimizer",
                    ModelCategory::Optimization,
                    ModelParameters::regression(),
                )
                .with_status(status)
                .with_accuracy(0.87),
            )
            .unwrap();
        let telemetry = Arc::new(InMemoryTelemetrySink::new());
        let dispatcher = InferenceDispatcher::with_builtin_strategies(registry, telemetry.clone());
        (dispatcher, telemetry)
    }

    fn cost_request() -> PredictionRequest {
        PredictionRequest::new(
            "cost-optimizer",
            InputData::new().with("material_costs", 1000.0).with("labor_rates", 500.0),
        )
    }

    #[test]
    fn cost_optimizer_scenario() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let result = dispatcher.predict(&cost_request()).unwrap();

        assert!(result.confidence >= 0.87 - 1e-9 && result.confidence <= 0.97 + 1e-9);
        assert_eq!(result.probabilities.len(), 2);
        assert!((result.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(result.explanation.is_none());
        assert!(result.feature_importance.is_none());
    }

    #[test]
    fn not_ready_and_missing_models_are_rejected() {
        let (dispatcher, _) = setup(ModelStatus::Training);
        assert!(matches!(
            dispatcher.predict(&cost_request()),
            Err(AiError::ModelNotReady {
                status: ModelStatus::Training,
                ..
            })
        ));
        assert!(matches!(
            dispatcher.predict(&PredictionRequest::new("nope", InputData::new())),
            Err(AiError::ModelNotFound(_))
        ));
        assert_eq!(dispatcher.stats().failures, 2);
        assert_eq!(dispatcher.stats().total_inferences, 0);
    }

    #[test]
    fn missing_strategy_is_unsupported() {
        let registry = ModelRegistry::arc();
        registry
            .register(
                Model::new("m", "m", ModelCategory::Predictive, ModelParameters::regression())
                    .with_status(ModelStatus::Ready),
            )
            .unwrap();
        let dispatcher = InferenceDispatcher::new(registry, Arc::new(InMemoryTelemetrySink::new()));
        assert_eq!(
            dispatcher.predict(&PredictionRequest::new("m", InputData::new())),
            Err(AiError::UnsupportedModelKind(ModelKind::Regression))
        );
    }

    #[test]
    fn emits_latency_telemetry_with_tags() {
        let (dispatcher, telemetry) = setup(ModelStatus::Ready);
        dispatcher.predict(&cost_request().real_time()).unwrap();

        let observed = telemetry.by_metric(INFERENCE_LATENCY_METRIC);
        assert_eq!(observed.len(), 1);
        let tags = &observed[0].tags;
        assert_eq!(tags["model_id"], "cost-optimizer");
        assert_eq!(tags["kind"], "regression");
        assert_eq!(tags["real_time"], "true");
        assert!(tags.contains_key("confidence"));
        assert_eq!(observed[0].unit, "ms");
    }

    #[test]
    fn explain_flag_adds_explanation() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let result = dispatcher.predict(&cost_request().explained()).unwrap();

        assert!(result.explanation.unwrap().contains("Cost optimizer"));
        assert_eq!(result.feature_importance.unwrap().len(), 2);
    }

    #[test]
    fn stats_accumulate() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        for _ in 0..3 {
            dispatcher.predict(&cost_request()).unwrap();
        }
        let stats = dispatcher.stats();
        assert_eq!(stats.total_inferences, 3);
        assert!(stats.mean_latency_ms() >= 0.0);
    }

    #[test]
    fn unrepairable_distributions_fail() {
        let (mut dispatcher, _) = setup(ModelStatus::Ready);
        dispatcher.register_strategy(Arc::new(Fixed(Inference::new(
            PredictionValue::Number(1.0),
            0.5,
            vec![f64::NAN, 1.0],
        ))));
        assert!(matches!(
            dispatcher.predict(&cost_request()),
            Err(AiError::InferenceFailed(_))
        ));
    }

    #[test]
    fn cache_serves_repeats_and_counts_lookups() {
        let (dispatcher, telemetry) = setup(ModelStatus::Ready);
        let dispatcher = dispatcher.with_cache(10, Duration::from_secs(60));

        let first = dispatcher.predict(&cost_request()).unwrap();
        let second = dispatcher.predict(&cost_request()).unwrap();
        let explained = dispatcher.predict(&cost_request().explained()).unwrap();

        assert_eq!(second.value, first.value);
        assert_eq!(second.timestamp, first.timestamp);
        assert!(explained.explanation.is_some());

        let stats = dispatcher.stats();
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 2));
        assert_eq!(stats.total_inferences, 3);
        assert!((stats.cache_hit_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(dispatcher.cache_len(), Some(2));
        assert_eq!(telemetry.by_metric(INFERENCE_LATENCY_METRIC).len(), 2);
    }

    #[test]
    fn cache_is_off_by_default_and_never_bypasses_readiness() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        dispatcher.predict(&cost_request()).unwrap();
        assert_eq!(dispatcher.cache_len(), None);
        assert_eq!(dispatcher.stats().cache_hit_rate(), 0.0);

        let (dispatcher, _) = setup(ModelStatus::Ready);
        let dispatcher = dispatcher.with_cache(10, Duration::from_secs(60));
        dispatcher.predict(&cost_request()).unwrap();
        dispatcher
            .registry()
            .transition(&ModelId::from("cost-optimizer"), ModelStatus::Deprecated)
            .unwrap();
        assert!(matches!(
            dispatcher.predict(&cost_request()),
            Err(AiError::ModelNotReady { .. })
        ));
        assert_eq!(dispatcher.stats().cache_hits, 0);
    }

    #[test]
    fn expired_results_are_recomputed() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let dispatcher = dispatcher.with_cache(10, Duration::from_millis(20));

        dispatcher.predict(&cost_request()).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        dispatcher.predict(&cost_request()).unwrap();

        let stats = dispatcher.stats();
        assert_eq!((stats.cache_hits, stats.cache_misses), (0, 2));
    }

    #[test]
    fn batch_keeps_request_order_and_isolates_failures() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let results = dispatcher.predict_batch(&[
            cost_request(),
            PredictionRequest::new("nope", InputData::new()),
            cost_request().explained(),
        ]);

        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().is_ok_and(|r| r.explanation.is_none()));
        assert!(matches!(results[1], Err(AiError::ModelNotFound(_))));
        assert!(results[2].as_ref().is_ok_and(|r| r.explanation.is_some()));
        assert_eq!(dispatcher.stats().total_inferences, 2);
        assert_eq!(dispatcher.stats().failures, 1);
    }

    #[test]
    fn model_info_reports_servability() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let info = dispatcher.model_info(&ModelId::from("cost-optimizer")).unwrap();
        assert_eq!(info.kind, ModelKind::Regression);
        assert_eq!(info.status, ModelStatus::Ready);
        assert!(info.servable);

        let bare = InferenceDispatcher::new(dispatcher.registry().clone(), Arc::new(InMemoryTelemetrySink::new()));
        assert!(!bare.model_info(&ModelId::from("cost-optimizer")).unwrap().servable);
        assert!(matches!(
            dispatcher.model_info(&ModelId::from("nope")),
            Err(AiError::ModelNotFound(_))
        ));
    }

    #[test]
    fn routed_prediction_uses_the_only_weighted_route() {
        let (dispatcher, _) = setup(ModelStatus::Ready);
        let split = TrafficSplit::new()
            .with_route("retired", 0.0)
            .with_route("cost-optimizer", 1.0);

        let result = dispatcher
            .predict_routed(&split, cost_request().input_data, PredictionFlags::default())
            .unwrap();
        assert_eq!(result.model_id, ModelId::from("cost-optimizer"));
        assert!(matches!(
            dispatcher.predict_routed(&TrafficSplit::new(), InputData::new(), PredictionFlags::default()),
            Err(AiError::InvalidInput(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn output_contract_holds_for_any_strategy_output(
            confidence in -10.0f64..10.0,
            probabilities in prop::collection::vec(0.0f64..100.0, 1..8),
        ) {
            prop_assume!(probabilities.iter().sum::<f64>() > 0.0);

            let (mut dispatcher, _) = setup(ModelStatus::Ready);
            dispatcher.register_strategy(Arc::new(Fixed(Inference::new(
                PredictionValue::Number(0.0),
                confidence,
                probabilities.clone(),
            ))));

            let result = dispatcher.predict(&cost_request()).unwrap();
            prop_assert!((0.0..=MAX_CONFIDENCE).contains(&result.confidence));
            prop_assert_eq!(result.probabilities.len(), probabilities.len());
            prop_assert!((result.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-6);
            prop_assert_eq!(result.model_id, ModelId::from("cost-optimizer"));
        }
    }
}
