//! Bounded, time-limited cache of prediction results.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use siteops_core::ModelId;

use crate::request::{FeatureValue, PredictionRequest};
use crate::result::PredictionResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FeatureKey {
    Number(u64),
    Category(String),
}

/// Model id, model version and the exact input (order included) of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    model_id: ModelId,
    model_version: String,
    features: Vec<(String, FeatureKey)>,
    explain: bool,
}

impl CacheKey {
    pub fn new(request: &PredictionRequest, model_version: &str) -> Self {
        let features = request
            .input_data
            .iter()
            .map(|(name, value)| {
                let key = match value {
                    FeatureValue::Number(v) => FeatureKey::Number(v.to_bits()),
                    FeatureValue::Category(s) => FeatureKey::Category(s.clone()),
                };
                (name.to_string(), key)
            })
            .collect();
        Self {
            model_id: request.model_id.clone(),
            model_version: model_version.to_string(),
            features,
            explain: request.flags.explain,
        }
    }
}

#[derive(Debug)]
struct Cached {
    result: PredictionResult,
    inserted_at: Instant,
}

/// Results expire `ttl` after insertion. When full, expired entries are
/// dropped first, then the oldest.
#[derive(Debug)]
pub struct PredictionCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<CacheKey, Cached>,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl PredictionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<PredictionResult> {
        let fresh = self.entries.get(key)?.inserted_at.elapsed() < self.ttl;
        if !fresh {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|c| c.result.clone())
    }

    pub fn insert(&mut self, key: CacheKey, result: PredictionResult) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let ttl = self.ttl;
            self.entries.retain(|_, c| c.inserted_at.elapsed() < ttl);
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, c)| c.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Cached {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
