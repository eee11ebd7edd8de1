//! Rule, condition and action definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::RuleId;

use crate::store::RuleStoreError;

/// Amount subtracted from `success_rate` after a tick with any error.
pub const SUCCESS_RATE_DECAY: f64 = 0.01;

/// A duration written as `<n><unit>` with unit one of `s m h d w` (e.g. `"7d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(Duration);

impl Period {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .char_indices()
            .last()
            .map(|(i, _)| i)
            .ok_or_else(|| "duration must not be empty".to_string())?;
        let (amount, unit) = s.split_at(split);

        let amount: u64 = amount
            .parse()
            .map_err(|_| format!("invalid duration '{s}': expected <n><s|m|h|d|w>"))?;
        let scale = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            "w" => 7 * 24 * 60 * 60,
            _ => return Err(format!("invalid duration unit in '{s}': expected one of s, m, h, d, w")),
        };

        amount
            .checked_mul(scale)
            .map(Period::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Period {
    /// Largest unit that divides the duration exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        for (unit, scale) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
            if secs != 0 && secs % scale == 0 {
                return write!(f, "{}{unit}", secs / scale);
            }
        }
        write!(f, "{secs}s")
    }
}

/// What a condition is watching for, as a label for grouping and reporting.
///
/// Evaluation ignores it: the operator, the comparand and the value read from
/// the signal provider alone decide the outcome. A `Prediction` condition reads
/// a field some upstream job keeps filled with model output, like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Threshold,
    Pattern,
    Anomaly,
    Prediction,
    Time,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Ne,
    In,
    Contains,
    Regex,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live signal value as reported by a signal provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        SignalValue::Number(value)
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        SignalValue::Bool(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Text(value)
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Comparand {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<SignalValue>),
}

impl From<f64> for Comparand {
    fn from(value: f64) -> Self {
        Comparand::Number(value)
    }
}

impl From<&str> for Comparand {
    fn from(value: &str) -> Self {
        Comparand::Text(value.to_string())
    }
}

/// One comparison of a named signal. Conditions of a rule are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub field: String,
    pub operator: Operator,
    pub value: Comparand,
    /// Minimum provider confidence in the signal for the condition to hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Period>,
}

impl Condition {
    pub fn new(kind: ConditionKind, field: impl Into<String>, operator: Operator, value: impl Into<Comparand>) -> Self {
        Self {
            kind,
            field: field.into(),
            operator,
            value: value.into(),
            confidence: None,
            window: None,
        }
    }

    pub fn threshold(field: impl Into<String>, operator: Operator, value: f64) -> Self {
        Self::new(ConditionKind::Threshold, field, operator, value)
    }

    pub fn with_confidence(mut self, floor: f64) -> Self {
        self.confidence = Some(floor);
        self
    }

    pub fn with_window(mut self, window: Period) -> Self {
        self.window = Some(window);
        self
    }

    /// Shape checks that would otherwise only surface mid-tick.
    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field must not be empty".into());
        }
        if let Some(floor) = self.confidence {
            if !(0.0..=1.0).contains(&floor) {
                return Err(format!("confidence floor for '{}' must be within [0, 1]", self.field));
            }
        }

        match (self.operator, &self.value) {
            (Operator::Gt | Operator::Lt, Comparand::Number(n)) if n.is_finite() => Ok(()),
            (Operator::Gt | Operator::Lt, _) => {
                Err(format!("'{}' {} needs a finite number", self.field, self.operator))
            }
            (Operator::In, Comparand::List(_)) => Ok(()),
            (Operator::In, _) => Err(format!("'{}' in needs a list", self.field)),
            (Operator::Contains, Comparand::Text(_)) => Ok(()),
            (Operator::Contains, _) => Err(format!("'{}' contains needs text", self.field)),
            (Operator::Regex, Comparand::Text(pattern)) => regex::Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid pattern for '{}': {e}", self.field)),
            (Operator::Regex, _) => Err(format!("'{}' regex needs a pattern string", self.field)),
            (Operator::Eq | Operator::Ne, Comparand::List(_)) => {
                Err(format!("'{}' {} cannot compare against a list", self.field, self.operator))
            }
            (Operator::Eq | Operator::Ne, _) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Notification,
    Adjustment,
    Escalation,
    ResourceAllocation,
    WorkflowTrigger,
    ApiCall,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Notification => "notification",
            ActionKind::Adjustment => "adjustment",
            ActionKind::Escalation => "escalation",
            ActionKind::ResourceAllocation => "resource_allocation",
            ActionKind::WorkflowTrigger => "workflow_trigger",
            ActionKind::ApiCall => "api_call",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// A side effect performed through the action sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub target: String,
    #[serde(default)]
    pub parameters: Parameters,
    /// Waited out before the first sink call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Period>,
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Invoked once if this action finally fails. Its own rollback is never run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<Action>>,
}

impl Action {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            parameters: Parameters::new(),
            delay: None,
            retry_count: 0,
            rollback: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_delay(mut self, delay: Period) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_rollback(mut self, rollback: Action) -> Self {
        self.rollback = Some(Box::new(rollback));
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err(format!("{} action target must not be empty", self.kind));
        }
        if let Some(rollback) = &self.rollback {
            rollback.validate()?;
        }
        Ok(())
    }
}

/// Execution statistics, owned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Within \[0, 1\]. Decays on error; only an explicit reset raises it.
    pub success_rate: f64,
}

impl Default for RuleStats {
    fn default() -> Self {
        Self {
            execution_count: 0,
            last_executed_at: None,
            success_rate: 1.0,
        }
    }
}

impl RuleStats {
    /// Apply one tick's outcome for a rule.
    pub fn record(&mut self, fired: bool, had_error: bool, at: DateTime<Utc>) {
        if fired {
            self.execution_count += 1;
            self.last_executed_at = Some(at);
        }
        if had_error {
            self.success_rate = (self.success_rate - SUCCESS_RATE_DECAY).max(0.0);
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A named AND-combination of conditions that triggers an ordered action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Lower runs first; ties broken by id.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub stats: RuleStats,
}

impl AutomationRule {
    pub fn new(id: impl Into<RuleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
            enabled: true,
            priority: 0,
            triggers: Vec::new(),
            stats: RuleStats::default(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Evaluation order key.
    pub fn order_key(&self) -> (i32, &RuleId) {
        (self.priority, &self.id)
    }

    pub fn validate(&self) -> Result<(), RuleStoreError> {
        let invalid = |msg: String| RuleStoreError::InvalidRule {
            id: self.id.clone(),
            reason: msg,
        };

        if self.id.as_str().trim().is_empty() {
            return Err(invalid("rule id must not be empty".into()));
        }
        for condition in &self.conditions {
            condition.validate().map_err(invalid)?;
        }
        for action in &self.actions {
            action.validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// Partial update of a rule's definition fields. Stats cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub triggers: Option<Vec<String>>,
}

impl RulePatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn apply_to(self, rule: &mut AutomationRule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(category) = self.category {
            rule.category = category;
        }
        if let Some(conditions) = self.conditions {
            rule.conditions = conditions;
        }
        if let Some(actions) = self.actions {
            rule.actions = actions;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(triggers) = self.triggers {
            rule.triggers = triggers;
        }
    }
}
