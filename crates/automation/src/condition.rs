//! Condition evaluation against live signals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

use siteops_core::SubjectId;

use crate::rule::{Comparand, Condition, Operator, SignalValue};

/// Numbers closer than this compare equal.
const EPSILON: f64 = 1e-9;

/// Compiled regex conditions kept per evaluator; the cache is emptied when full.
pub const MAX_CACHED_PATTERNS: usize = 256;

/// Source of live signal values for a subject.
#[async_trait]
pub trait SignalProvider: Send + Sync + 'static {
    /// Current value of `field`, optionally aggregated over `window`.
    async fn get_value(
        &self,
        subject: &SubjectId,
        field: &str,
        window: Option<Duration>,
    ) -> Result<SignalValue, SignalError>;

    /// Confidence in the current value of `field`, if the provider tracks one.
    async fn confidence(&self, _subject: &SubjectId, _field: &str) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("no signal '{field}' for subject {subject}")]
    Missing { subject: SubjectId, field: String },
    #[error("signal provider failure: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("reading '{field}': {source}")]
    Signal {
        field: String,
        #[source]
        source: SignalError,
    },
    #[error("reading '{field}' timed out after {after:?}")]
    Timeout { field: String, after: Duration },
    #[error("'{field}' {operator}: {detail}")]
    TypeMismatch {
        field: String,
        operator: Operator,
        detail: String,
    },
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Evaluates conditions through a [`SignalProvider`], bounding every read by
/// `io_timeout`.
pub struct ConditionEvaluator {
    provider: Arc<dyn SignalProvider>,
    io_timeout: Duration,
    patterns: Mutex<HashMap<String, Regex>>,
}

impl ConditionEvaluator {
    pub fn new(provider: Arc<dyn SignalProvider>, io_timeout: Duration) -> Self {
        Self {
            provider,
            io_timeout,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// AND over `conditions` in order; stops reading signals at the first
    /// condition that does not hold.
    pub async fn evaluate_all(&self, subject: &SubjectId, conditions: &[Condition]) -> Result<bool, ConditionError> {
        for condition in conditions {
            if !self.evaluate(subject, condition).await? {
                trace!(subject = %subject, field = %condition.field, "condition not met");
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn evaluate(&self, subject: &SubjectId, condition: &Condition) -> Result<bool, ConditionError> {
        let field = condition.field.as_str();
        let window = condition.window.map(|w| w.as_duration());

        let value = tokio::time::timeout(self.io_timeout, self.provider.get_value(subject, field, window))
            .await
            .map_err(|_| self.timeout(field))?
            .map_err(|source| ConditionError::Signal {
                field: field.to_string(),
                source,
            })?;

        if !self.compare(condition, &value)? {
            return Ok(false);
        }

        let Some(floor) = condition.confidence else {
            return Ok(true);
        };
        let confidence = tokio::time::timeout(self.io_timeout, self.provider.confidence(subject, field))
            .await
            .map_err(|_| self.timeout(field))?;
        Ok(confidence.is_none_or(|c| c >= floor))
    }

    fn timeout(&self, field: &str) -> ConditionError {
        ConditionError::Timeout {
            field: field.to_string(),
            after: self.io_timeout,
        }
    }

    fn compare(&self, condition: &Condition, value: &SignalValue) -> Result<bool, ConditionError> {
        let mismatch = |detail: String| ConditionError::TypeMismatch {
            field: condition.field.clone(),
            operator: condition.operator,
            detail,
        };

        match (condition.operator, value, &condition.value) {
            (Operator::Gt, SignalValue::Number(v), Comparand::Number(t)) => Ok(v > t),
            (Operator::Lt, SignalValue::Number(v), Comparand::Number(t)) => Ok(v < t),
            (Operator::Eq | Operator::Ne, v, c) => {
                let equal = scalar_eq(v, c).ok_or_else(|| mismatch(format!("cannot compare {v:?} with {c:?}")))?;
                Ok(equal == (condition.operator == Operator::Eq))
            }
            (Operator::In, v, Comparand::List(items)) => Ok(items.iter().any(|item| signal_eq(v, item))),
            (Operator::Contains, SignalValue::Text(v), Comparand::Text(needle)) => Ok(v.contains(needle.as_str())),
            (Operator::Regex, SignalValue::Text(v), Comparand::Text(pattern)) => {
                Ok(self.pattern(pattern)?.is_match(v))
            }
            (op, v, c) => Err(mismatch(format!("{op} is not defined for {v:?} and {c:?}"))),
        }
    }

    fn pattern(&self, pattern: &str) -> Result<Regex, ConditionError> {
        let mut cache = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| ConditionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        if cache.len() >= MAX_CACHED_PATTERNS {
            trace!(cached = cache.len(), "pattern cache full; clearing");
            cache.clear();
        }
        cache.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    #[cfg(test)]
    fn cached_patterns(&self) -> usize {
        self.patterns.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn signal_eq(a: &SignalValue, b: &SignalValue) -> bool {
    match (a, b) {
        (SignalValue::Number(x), SignalValue::Number(y)) => (x - y).abs() < EPSILON,
        (SignalValue::Text(x), SignalValue::Text(y)) => x == y,
        (SignalValue::Bool(x), SignalValue::Bool(y)) => x == y,
        _ => false,
    }
}

/// `None` when the two sides have different types.
fn scalar_eq(value: &SignalValue, comparand: &Comparand) -> Option<bool> {
    match (value, comparand) {
        (SignalValue::Number(x), Comparand::Number(y)) => Some((x - y).abs() < EPSILON),
        (SignalValue::Text(x), Comparand::Text(y)) => Some(x == y),
        (SignalValue::Bool(x), Comparand::Bool(y)) => Some(x == y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemorySignalProvider;
    use crate::rule::{ConditionKind, Period};

    fn evaluator(provider: InMemorySignalProvider) -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(provider), Duration::from_secs(10))
    }

    fn subject() -> SubjectId {
        SubjectId::from("project-1")
    }

    #[tokio::test]
    async fn compares_by_operator() {
        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "variance", 0.2);
        provider.set(&subject(), "phase", "framing");
        provider.set(&subject(), "notes", "Crane inspection overdue");
        let eval = evaluator(provider);

        let cases = [
            (Condition::threshold("variance", Operator::Gt, 0.15), true),
            (Condition::threshold("variance", Operator::Lt, 0.15), false),
            (Condition::threshold("variance", Operator::Eq, 0.2), true),
            (Condition::threshold("variance", Operator::Ne, 0.2), false),
            (
                Condition::new(
                    ConditionKind::Pattern,
                    "phase",
                    Operator::In,
                    Comparand::List(vec!["framing".into(), "roofing".into()]),
                ),
                true,
            ),
            (Condition::new(ConditionKind::Event, "notes", Operator::Contains, "inspection"), true),
            (Condition::new(ConditionKind::Pattern, "notes", Operator::Regex, r"(?i)^crane\b"), true),
            (Condition::new(ConditionKind::Pattern, "notes", Operator::Regex, r"^Scaffold"), false),
        ];

        for (condition, expected) in cases {
            assert_eq!(
                eval.evaluate(&subject(), &condition).await.unwrap(),
                expected,
                "{condition:?}"
            );
        }
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "phase", "framing");
        let eval = evaluator(provider);

        let err = eval
            .evaluate(&subject(), &Condition::threshold("phase", Operator::Gt, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::TypeMismatch { operator: Operator::Gt, .. }));
    }

    #[tokio::test]
    async fn missing_signal_is_an_error() {
        let eval = evaluator(InMemorySignalProvider::new());
        let err = eval
            .evaluate(&subject(), &Condition::threshold("variance", Operator::Gt, 0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::Signal { source: SignalError::Missing { .. }, .. }));
    }

    #[tokio::test]
    async fn short_circuits_on_first_false_condition() {
        let provider = Arc::new(InMemorySignalProvider::new().with_read_log());
        provider.set(&subject(), "budget_variance", 0.20);
        provider.set(&subject(), "quality_metrics", 0.90);
        let eval = ConditionEvaluator::new(provider.clone(), Duration::from_secs(10));

        let conditions = [
            Condition::threshold("quality_metrics", Operator::Lt, 0.85),
            Condition::threshold("budget_variance", Operator::Gt, 0.15),
        ];
        assert!(!eval.evaluate_all(&subject(), &conditions).await.unwrap());
        assert_eq!(provider.reads(), vec!["quality_metrics".to_string()]);
    }

    #[tokio::test]
    async fn confidence_floor_applies_only_when_reported() {
        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "delay_risk", 0.8);
        let eval = evaluator(provider);
        let condition = Condition::threshold("delay_risk", Operator::Gt, 0.5).with_confidence(0.9);
        assert!(eval.evaluate(&subject(), &condition).await.unwrap());

        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "delay_risk", 0.8);
        provider.set_confidence(&subject(), "delay_risk", 0.6);
        let eval = evaluator(provider);
        assert!(!eval.evaluate(&subject(), &condition).await.unwrap());
    }

    #[tokio::test]
    async fn window_is_passed_to_provider() {
        let provider = Arc::new(InMemorySignalProvider::new());
        provider.set(&subject(), "incidents", 2.0);
        let eval = ConditionEvaluator::new(provider.clone(), Duration::from_secs(10));

        let condition = Condition::threshold("incidents", Operator::Gt, 1.0).with_window("7d".parse::<Period>().unwrap());
        assert!(eval.evaluate(&subject(), &condition).await.unwrap());
        assert_eq!(provider.last_window(), Some(Duration::from_secs(7 * 86_400)));
    }

    #[tokio::test]
    async fn kind_does_not_change_the_outcome() {
        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "delay_risk", 0.8);
        let eval = evaluator(provider);

        for kind in [
            ConditionKind::Threshold,
            ConditionKind::Pattern,
            ConditionKind::Anomaly,
            ConditionKind::Prediction,
            ConditionKind::Time,
            ConditionKind::Event,
        ] {
            let above = Condition::new(kind, "delay_risk", Operator::Gt, 0.5);
            let below = Condition::new(kind, "delay_risk", Operator::Lt, 0.5);
            assert!(eval.evaluate(&subject(), &above).await.unwrap(), "{kind:?}");
            assert!(!eval.evaluate(&subject(), &below).await.unwrap(), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn pattern_cache_stays_bounded() {
        let provider = InMemorySignalProvider::new();
        provider.set(&subject(), "notes", "crew 17 on site");
        let eval = evaluator(provider);

        for n in 0..(MAX_CACHED_PATTERNS * 3) {
            let condition = Condition::new(
                ConditionKind::Pattern,
                "notes",
                Operator::Regex,
                Comparand::Text(format!("crew {n}\\b")),
            );
            assert_eq!(eval.evaluate(&subject(), &condition).await.unwrap(), n == 17);
            assert!(eval.cached_patterns() <= MAX_CACHED_PATTERNS);
        }
        assert!(eval.cached_patterns() > 0);
    }

    struct Stalled;

    #[async_trait]
    impl SignalProvider for Stalled {
        async fn get_value(&self, _: &SubjectId, _: &str, _: Option<Duration>) -> Result<SignalValue, SignalError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reads_time_out() {
        let eval = ConditionEvaluator::new(Arc::new(Stalled), Duration::from_secs(10));
        let err = eval
            .evaluate(&subject(), &Condition::threshold("x", Operator::Gt, 0.0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConditionError::Timeout {
                field: "x".into(),
                after: Duration::from_secs(10),
            }
        );
    }
}
