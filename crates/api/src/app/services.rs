use std::sync::Arc;

use siteops_ai::{InferenceDispatcher, ModelRegistry, Recommender};
use siteops_automation::{
    ActionSink, AutomationEngine, EngineConfig, InMemoryRuleStore, InMemorySignalProvider, LoggingActionSink,
    RuleStore, Scheduler,
};
use siteops_observability::{TelemetrySink, TracingTelemetrySink};

use crate::config::{InferenceCacheConfig, ServerConfig};

/// Everything the handlers reach through `Extension<Arc<AppServices>>`.
pub struct AppServices {
    pub registry: Arc<ModelRegistry>,
    pub dispatcher: Arc<InferenceDispatcher>,
    pub recommender: Recommender,
    pub rules: Arc<dyn RuleStore>,
    pub signals: Arc<InMemorySignalProvider>,
    pub scheduler: Scheduler,
}

impl AppServices {
    /// In-memory wiring: actions are logged, telemetry goes to `tracing`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::assemble(
            config.engine.clone(),
            config.inference_cache,
            Arc::new(LoggingActionSink),
            Arc::new(TracingTelemetrySink),
        )
    }

    pub fn with_collaborators(
        config: EngineConfig,
        sink: Arc<dyn ActionSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::assemble(config, None, sink, telemetry)
    }

    pub fn assemble(
        config: EngineConfig,
        inference_cache: Option<InferenceCacheConfig>,
        sink: Arc<dyn ActionSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let registry = ModelRegistry::arc();
        let mut dispatcher = InferenceDispatcher::with_builtin_strategies(registry.clone(), telemetry.clone());
        if let Some(cache) = inference_cache {
            dispatcher = dispatcher.with_cache(cache.capacity, cache.ttl);
        }
        let dispatcher = Arc::new(dispatcher);
        let rules: Arc<dyn RuleStore> = InMemoryRuleStore::arc();
        let signals = Arc::new(InMemorySignalProvider::new());

        let engine = Arc::new(AutomationEngine::new(
            rules.clone(),
            signals.clone(),
            sink,
            telemetry,
            &config,
        ));

        Self {
            recommender: Recommender::new(dispatcher.clone()),
            scheduler: Scheduler::new(engine, registry.clone(), config),
            registry,
            dispatcher,
            rules,
            signals,
        }
    }
}
