//! `siteops-automation`
//!
//! **Responsibility:** periodic evaluation of automation rules against live
//! signals, plus the retraining sweep over the model registry.
//!
//! ## Components
//!
//! - `RuleStore`: rule definitions and execution statistics
//! - `ConditionEvaluator`: AND-combined conditions read through a `SignalProvider`
//! - `ActionExecutor`: ordered action chains with retry and rollback via an `ActionSink`
//! - `AutomationEngine`: one tick over a set of subjects (single-flight per subject)
//! - `Scheduler`: the tick and retraining timer loops

pub mod action;
pub mod condition;
pub mod config;
pub mod engine;
pub mod providers;
pub mod retrain;
pub mod rule;
pub mod scheduler;
pub mod store;

pub use action::{ActionError, ActionExecutor, ActionSink, ChainReport, RetryBackoff};
pub use condition::{ConditionError, ConditionEvaluator, SignalError, SignalProvider};
pub use config::{ConfigError, EngineConfig};
pub use engine::{AutomationEngine, RuleOutcome, SubjectOutcome, SubjectReport, TickReport};
pub use providers::{InMemorySignalProvider, LoggingActionSink, RecordedCall, RecordingActionSink};
pub use retrain::RetrainReport;
pub use rule::{
    Action, ActionKind, AutomationRule, Comparand, Condition, ConditionKind, Operator, Parameters, Period,
    RulePatch, RuleStats, SignalValue,
};
pub use scheduler::Scheduler;
pub use store::{InMemoryRuleStore, RuleStore, RuleStoreError};
