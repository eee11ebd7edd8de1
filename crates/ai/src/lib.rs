//! `siteops-ai`
//!
//! **Responsibility:** model registry and type-dispatched inference.
//!
//! - The registry is the only owner of model state; callers get snapshots.
//! - Inference is synchronous and side-effect free apart from telemetry and
//!   the dispatcher's running statistics.
//! - Kind-specific math lives behind [`InferenceStrategy`]; the dispatcher
//!   enforces the result contract whatever the strategy returns.
//! - Result caching and traffic splitting are opt-in and sit in front of the
//!   same dispatch path.

pub mod cache;
pub mod dispatcher;
pub mod explain;
pub mod model;
pub mod recommend;
pub mod registry;
pub mod request;
pub mod result;
pub mod routing;
pub mod strategies;
pub mod strategy;

pub use cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, PredictionCache};
pub use dispatcher::{InferenceDispatcher, InferenceStats, ModelInfo, INFERENCE_LATENCY_METRIC, MAX_CONFIDENCE};
pub use model::{DenseLayer, Model, ModelCategory, ModelKind, ModelMetrics, ModelParameters, ModelStatus};
pub use recommend::{Recommendation, RecommendationTarget, Recommender, Urgency};
pub use registry::ModelRegistry;
pub use request::{FeatureValue, InputData, PredictionFlags, PredictionRequest};
pub use result::{AiError, FeatureImportance, Impact, PredictionResult, PredictionValue};
pub use routing::{TrafficRoute, TrafficSplit};
pub use strategy::{Inference, InferenceStrategy};
