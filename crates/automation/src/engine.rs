//! Rule evaluation over a set of subjects.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use siteops_core::SubjectId;
use siteops_observability::{TelemetrySink, tags};

use crate::action::{ActionExecutor, ActionSink};
use crate::condition::{ConditionEvaluator, SignalProvider};
use crate::config::EngineConfig;
use crate::rule::AutomationRule;
use crate::store::RuleStore;

pub const TICK_METRIC: &str = "automation.tick";

/// Outcome of one rule for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RuleOutcome {
    NotTriggered,
    Fired { actions_failed: usize },
    ConditionError,
}

impl RuleOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, RuleOutcome::Fired { .. })
    }

    pub fn had_error(&self) -> bool {
        match self {
            RuleOutcome::NotTriggered => false,
            RuleOutcome::Fired { actions_failed } => *actions_failed > 0,
            RuleOutcome::ConditionError => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SubjectOutcome {
    Evaluated {
        rules_evaluated: usize,
        rules_fired: usize,
        errors: usize,
    },
    /// A tick for the subject was already in flight.
    Skipped,
    /// Rules could not be loaded.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectReport {
    pub subject: SubjectId,
    #[serde(flatten)]
    pub outcome: SubjectOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub subjects: Vec<SubjectReport>,
}

impl TickReport {
    pub fn outcome_for(&self, subject: &SubjectId) -> Option<SubjectOutcome> {
        self.subjects
            .iter()
            .find(|r| &r.subject == subject)
            .map(|r| r.outcome)
    }

    pub fn rules_fired(&self) -> usize {
        self.subjects
            .iter()
            .map(|r| match r.outcome {
                SubjectOutcome::Evaluated { rules_fired, .. } => rules_fired,
                _ => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.subjects
            .iter()
            .filter(|r| r.outcome == SubjectOutcome::Skipped)
            .count()
    }
}

/// Removes the subject from the in-flight set when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<SubjectId>>>,
    subject: SubjectId,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<SubjectId>>>, subject: &SubjectId) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.clone());
        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            subject: subject.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.subject);
    }
}

/// Evaluates enabled rules against subjects and runs the actions of rules
/// that fire. Errors are absorbed into stats and reports, never returned.
pub struct AutomationEngine {
    store: Arc<dyn RuleStore>,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    telemetry: Arc<dyn TelemetrySink>,
    in_flight: Arc<Mutex<HashSet<SubjectId>>>,
}

impl AutomationEngine {
    pub fn new(
        store: Arc<dyn RuleStore>,
        signals: Arc<dyn SignalProvider>,
        sink: Arc<dyn ActionSink>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            evaluator: ConditionEvaluator::new(signals, config.io_timeout),
            executor: ActionExecutor::new(sink, config.io_timeout, config.retry_backoff),
            telemetry,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Evaluate every enabled rule, in priority order, for each subject in turn.
    ///
    /// A subject whose previous tick is still running is skipped.
    pub async fn run_tick(&self, subjects: &[SubjectId]) -> TickReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut reports = Vec::with_capacity(subjects.len());

        for subject in subjects {
            let outcome = match InFlightGuard::acquire(&self.in_flight, subject) {
                Some(_guard) => self.run_subject(subject).await,
                None => {
                    debug!(subject = %subject, "tick already in flight; skipping");
                    SubjectOutcome::Skipped
                }
            };
            reports.push(SubjectReport {
                subject: subject.clone(),
                outcome,
            });
        }

        let report = TickReport {
            started_at,
            subjects: reports,
        };
        self.telemetry.record(
            TICK_METRIC,
            started.elapsed().as_secs_f64() * 1000.0,
            "ms",
            tags([
                ("subjects", subjects.len().to_string()),
                ("rules_fired", report.rules_fired().to_string()),
                ("skipped", report.skipped().to_string()),
            ]),
        );
        report
    }

    async fn run_subject(&self, subject: &SubjectId) -> SubjectOutcome {
        let rules = match self.store.enabled_in_priority_order() {
            Ok(rules) => rules,
            Err(e) => {
                error!(subject = %subject, error = %e, "failed to load rules");
                return SubjectOutcome::Failed;
            }
        };

        let (mut fired, mut errors) = (0, 0);
        for rule in &rules {
            let outcome = self.evaluate_rule(subject, rule).await;
            fired += usize::from(outcome.fired());
            errors += usize::from(outcome.had_error());
        }

        SubjectOutcome::Evaluated {
            rules_evaluated: rules.len(),
            rules_fired: fired,
            errors,
        }
    }

    /// Conditions, then actions if they all hold, then one stats update.
    pub async fn evaluate_rule(&self, subject: &SubjectId, rule: &AutomationRule) -> RuleOutcome {
        let outcome = match self.evaluator.evaluate_all(subject, &rule.conditions).await {
            Ok(false) => RuleOutcome::NotTriggered,
            Ok(true) => {
                info!(subject = %subject, rule = %rule.id, actions = rule.actions.len(), "rule fired");
                let chain = self.executor.run_chain(subject, &rule.id, &rule.actions).await;
                RuleOutcome::Fired {
                    actions_failed: chain.failed,
                }
            }
            Err(e) => {
                warn!(subject = %subject, rule = %rule.id, error = %e, "condition evaluation failed");
                RuleOutcome::ConditionError
            }
        };

        if outcome != RuleOutcome::NotTriggered {
            if let Err(e) = self
                .store
                .record_outcome(&rule.id, outcome.fired(), outcome.had_error(), Utc::now())
            {
                warn!(subject = %subject, rule = %rule.id, error = %e, "failed to record rule outcome");
            }
        }
        outcome
    }
}
