//! Timer loops driving rule ticks and the retraining sweep.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use siteops_ai::ModelRegistry;
use siteops_core::SubjectId;
use siteops_observability::tags;

use crate::config::EngineConfig;
use crate::engine::{AutomationEngine, TickReport};
use crate::retrain;

pub const RETRAIN_METRIC: &str = "retrain.sweep";

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the tick and retraining loops and the set of active subjects.
pub struct Scheduler {
    engine: Arc<AutomationEngine>,
    registry: Arc<ModelRegistry>,
    config: EngineConfig,
    active_subjects: Arc<RwLock<Vec<SubjectId>>>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(engine: Arc<AutomationEngine>, registry: Arc<ModelRegistry>, config: EngineConfig) -> Self {
        Self {
            engine,
            registry,
            config,
            active_subjects: Arc::new(RwLock::new(Vec::new())),
            running: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<AutomationEngine> {
        &self.engine
    }

    /// Add a subject to every subsequent tick. Returns false if already active.
    pub async fn add_subject(&self, subject: SubjectId) -> bool {
        let mut subjects = self.active_subjects.write().await;
        if subjects.contains(&subject) {
            return false;
        }
        info!(subject = %subject, "subject activated");
        subjects.push(subject);
        true
    }

    /// Returns false if the subject was not active.
    pub async fn remove_subject(&self, subject: &SubjectId) -> bool {
        let mut subjects = self.active_subjects.write().await;
        let before = subjects.len();
        subjects.retain(|s| s != subject);
        let removed = subjects.len() != before;
        if removed {
            info!(subject = %subject, "subject deactivated");
        }
        removed
    }

    pub async fn active_subjects(&self) -> Vec<SubjectId> {
        self.active_subjects.read().await.clone()
    }

    /// Run one tick over the active subjects now, outside the timer.
    pub async fn tick_now(&self) -> TickReport {
        let subjects = self.active_subjects().await;
        self.engine.run_tick(&subjects).await
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Spawn both loops. Returns false if they are already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return false;
        }

        let (shutdown, rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(tick_loop(
                self.engine.clone(),
                self.active_subjects.clone(),
                self.config.tick_interval,
                self.config.shutdown_grace,
                rx.clone(),
            )),
            tokio::spawn(retrain_loop(
                self.engine.clone(),
                self.registry.clone(),
                self.config.retrain_interval,
                self.config.retrain_step,
                rx,
            )),
        ];

        info!(
            tick_interval = ?self.config.tick_interval,
            retrain_interval = ?self.config.retrain_interval,
            "scheduler started"
        );
        *running = Some(Running { shutdown, tasks });
        true
    }

    /// Signal both loops and wait for them to finish their current iteration.
    /// A tick still running after the configured shutdown grace is aborted,
    /// which releases its subjects.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(Running { shutdown, tasks }) = running else {
            return;
        };

        let _ = shutdown.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler loop ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

async fn tick_loop(
    engine: Arc<AutomationEngine>,
    subjects: Arc<RwLock<Vec<SubjectId>>>,
    period: Duration,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let subjects = subjects.read().await.clone();
                if subjects.is_empty() {
                    continue;
                }

                let engine = engine.clone();
                let mut tick = tokio::spawn(async move { engine.run_tick(&subjects).await });
                let finished = tokio::select! {
                    joined = &mut tick => Some(joined),
                    _ = shutdown.changed() => None,
                };

                match finished {
                    Some(joined) => log_tick(joined),
                    None => {
                        match tokio::time::timeout(grace, &mut tick).await {
                            Ok(joined) => log_tick(joined),
                            Err(_) => {
                                tick.abort();
                                let _ = tick.await;
                                warn!(?grace, "tick still running at shutdown; aborted");
                            }
                        }
                        break;
                    }
                }
            }
        }
    }
}

fn log_tick(joined: Result<TickReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) => debug!(
            subjects = report.subjects.len(),
            rules_fired = report.rules_fired(),
            skipped = report.skipped(),
            "tick complete"
        ),
        Err(e) => error!(error = %e, "tick aborted"),
    }
}

async fn retrain_loop(
    engine: Arc<AutomationEngine>,
    registry: Arc<ModelRegistry>,
    period: Duration,
    step: f64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let registry = registry.clone();
                let sweep = tokio::task::spawn_blocking(move || {
                    retrain::sweep(&registry, step, &mut rand::thread_rng())
                });
                match sweep.await {
                    Ok(report) => {
                        info!(retrained = report.retrained.len(), failed = report.failed.len(), "retraining sweep complete");
                        engine.telemetry().record(
                            RETRAIN_METRIC,
                            report.retrained.len() as f64,
                            "models",
                            tags([("failed", report.failed.len())]),
                        );
                    }
                    Err(e) => error!(error = %e, "retraining sweep aborted"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use siteops_ai::{Model, ModelCategory, ModelParameters, ModelStatus};
    use siteops_observability::InMemoryTelemetrySink;

    use super::*;
    use crate::providers::{InMemorySignalProvider, RecordingActionSink};
    use crate::engine::SubjectOutcome;
    use crate::rule::{Action, ActionKind, AutomationRule, Condition, Operator, Period};
    use crate::store::{InMemoryRuleStore, RuleStore};

    struct Harness {
        scheduler: Scheduler,
        sink: Arc<RecordingActionSink>,
        telemetry: Arc<InMemoryTelemetrySink>,
    }

    fn delay_rule(action: Action) -> AutomationRule {
        AutomationRule::new("delay", "Delay")
            .with_condition(Condition::threshold("delay_days", Operator::Gt, 7.0))
            .with_action(action)
    }

    fn harness(config: EngineConfig) -> Harness {
        harness_with_rule(config, delay_rule(Action::new(ActionKind::Notification, "pm")))
    }

    fn harness_with_rule(config: EngineConfig, rule: AutomationRule) -> Harness {
        let store = InMemoryRuleStore::arc();
        let signals = Arc::new(InMemorySignalProvider::new());
        let sink = Arc::new(RecordingActionSink::new());
        let telemetry = Arc::new(InMemoryTelemetrySink::new());

        signals.set(&SubjectId::from("p1"), "delay_days", 10.0);
        store.add(rule).unwrap();

        let registry = ModelRegistry::arc();
        registry
            .register(
                Model::new("cost-optimizer", "Cost", ModelCategory::Optimization, ModelParameters::regression())
                    .with_status(ModelStatus::Ready)
                    .with_accuracy(0.87),
            )
            .unwrap();

        let engine = Arc::new(AutomationEngine::new(
            store,
            signals,
            sink.clone(),
            telemetry.clone(),
            &config,
        ));
        Harness {
            scheduler: Scheduler::new(engine, registry, config),
            sink,
            telemetry,
        }
    }

    #[tokio::test]
    async fn subjects_are_deduplicated() {
        let h = harness(EngineConfig::default());
        assert!(h.scheduler.add_subject("p1".into()).await);
        assert!(!h.scheduler.add_subject("p1".into()).await);
        assert!(h.scheduler.remove_subject(&"p1".into()).await);
        assert!(!h.scheduler.remove_subject(&"p1".into()).await);
        assert!(h.scheduler.active_subjects().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_runs_until_stopped() {
        let h = harness(EngineConfig::default().with_tick_interval(Duration::from_secs(5)));
        h.scheduler.add_subject("p1".into()).await;

        assert!(h.scheduler.start());
        assert!(!h.scheduler.start());
        tokio::time::sleep(Duration::from_secs(11)).await;
        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running());

        let fired = h.sink.calls().len();
        assert!(fired >= 2, "expected at least two ticks, saw {fired}");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.sink.calls().len(), fired);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_aborts_a_tick_stuck_in_a_long_delay() {
        let rule = delay_rule(
            Action::new(ActionKind::Notification, "pm").with_delay("7d".parse::<Period>().unwrap()),
        );
        let h = harness_with_rule(
            EngineConfig::default().with_shutdown_grace(Duration::from_secs(5)),
            rule,
        );
        h.scheduler.add_subject("p1".into()).await;
        h.scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(60), h.scheduler.stop()).await;
        assert!(stopped.is_ok(), "stop waited on the delayed action");
        assert!(!h.scheduler.is_running());
        assert!(h.sink.calls().is_empty());

        let report = h.scheduler.engine().run_tick(&["p1".into()]).await;
        assert!(matches!(
            report.outcome_for(&"p1".into()),
            Some(SubjectOutcome::Evaluated { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_a_short_tick_finish_within_grace() {
        let rule = delay_rule(Action::new(ActionKind::Notification, "pm").with_delay(Period::from_secs(2)));
        let h = harness_with_rule(
            EngineConfig::default().with_shutdown_grace(Duration::from_secs(5)),
            rule,
        );
        h.scheduler.add_subject("p1".into()).await;
        h.scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.scheduler.stop().await;
        assert_eq!(h.sink.calls_to("pm"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retrain_loop_sweeps_ready_models() {
        let h = harness(EngineConfig::default().with_retrain_interval(Duration::from_secs(60)));
        h.scheduler.start();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.telemetry.by_metric(RETRAIN_METRIC).is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.scheduler.stop().await;

        let sweeps = h.telemetry.by_metric(RETRAIN_METRIC);
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].value, 1.0);
    }

    #[tokio::test]
    async fn tick_now_uses_active_subjects() {
        let h = harness(EngineConfig::default());
        assert_eq!(h.scheduler.tick_now().await.subjects.len(), 0);

        h.scheduler.add_subject("p1".into()).await;
        let report = h.scheduler.tick_now().await;
        assert_eq!(report.rules_fired(), 1);
        assert_eq!(
            h.scheduler.engine().store().get(&"delay".into()).unwrap().stats.execution_count,
            1
        );
    }
}
