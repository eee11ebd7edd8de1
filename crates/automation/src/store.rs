//! Rule storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use siteops_core::RuleId;

use crate::rule::{AutomationRule, RulePatch, RuleStats};

/// Rule store abstraction.
///
/// Definition fields are written by admin operations only; `stats` only via
/// [`RuleStore::record_outcome`] and [`RuleStore::reset_success_rate`].
pub trait RuleStore: Send + Sync {
    /// Add a rule. Incoming stats are discarded.
    fn add(&self, rule: AutomationRule) -> Result<AutomationRule, RuleStoreError>;

    fn get(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError>;

    /// Merge `patch` into the rule's definition.
    fn update(&self, id: &RuleId, patch: RulePatch) -> Result<AutomationRule, RuleStoreError>;

    fn remove(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError>;

    /// All rules, in evaluation order.
    fn list(&self) -> Result<Vec<AutomationRule>, RuleStoreError>;

    /// Enabled rules sorted by (priority asc, id asc).
    fn enabled_in_priority_order(&self) -> Result<Vec<AutomationRule>, RuleStoreError> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }

    /// Atomically apply one tick's outcome to a rule's stats.
    fn record_outcome(
        &self,
        id: &RuleId,
        fired: bool,
        had_error: bool,
        at: DateTime<Utc>,
    ) -> Result<RuleStats, RuleStoreError>;

    /// Restore `success_rate` to 1.0.
    fn reset_success_rate(&self, id: &RuleId) -> Result<RuleStats, RuleStoreError>;
}

/// Rule store error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleStoreError {
    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),
    #[error("rule already exists: {0}")]
    DuplicateRuleId(RuleId),
    #[error("invalid rule {id}: {reason}")]
    InvalidRule { id: RuleId, reason: String },
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory rule store.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<RuleId, AutomationRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RuleId, AutomationRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RuleId, AutomationRule>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RuleStore for InMemoryRuleStore {
    fn add(&self, mut rule: AutomationRule) -> Result<AutomationRule, RuleStoreError> {
        rule.validate()?;
        rule.stats = RuleStats::default();

        let mut rules = self.write();
        if rules.contains_key(&rule.id) {
            return Err(RuleStoreError::DuplicateRuleId(rule.id));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    fn get(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RuleStoreError::RuleNotFound(id.clone()))
    }

    fn update(&self, id: &RuleId, patch: RulePatch) -> Result<AutomationRule, RuleStoreError> {
        let mut rules = self.write();
        let current = rules
            .get(id)
            .ok_or_else(|| RuleStoreError::RuleNotFound(id.clone()))?;

        let mut merged = current.clone();
        patch.apply_to(&mut merged);
        merged.validate()?;

        rules.insert(id.clone(), merged.clone());
        Ok(merged)
    }

    fn remove(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError> {
        self.write()
            .remove(id)
            .ok_or_else(|| RuleStoreError::RuleNotFound(id.clone()))
    }

    fn list(&self) -> Result<Vec<AutomationRule>, RuleStoreError> {
        let mut result: Vec<_> = self.read().values().cloned().collect();
        result.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(result)
    }

    fn record_outcome(
        &self,
        id: &RuleId,
        fired: bool,
        had_error: bool,
        at: DateTime<Utc>,
    ) -> Result<RuleStats, RuleStoreError> {
        let mut rules = self.write();
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| RuleStoreError::RuleNotFound(id.clone()))?;
        rule.stats.record(fired, had_error, at);
        Ok(rule.stats.clone())
    }

    fn reset_success_rate(&self, id: &RuleId) -> Result<RuleStats, RuleStoreError> {
        let mut rules = self.write();
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| RuleStoreError::RuleNotFound(id.clone()))?;
        rule.stats.success_rate = 1.0;
        Ok(rule.stats.clone())
    }
}

impl<S: RuleStore + ?Sized> RuleStore for Arc<S> {
    fn add(&self, rule: AutomationRule) -> Result<AutomationRule, RuleStoreError> {
        (**self).add(rule)
    }

    fn get(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError> {
        (**self).get(id)
    }

    fn update(&self, id: &RuleId, patch: RulePatch) -> Result<AutomationRule, RuleStoreError> {
        (**self).update(id, patch)
    }

    fn remove(&self, id: &RuleId) -> Result<AutomationRule, RuleStoreError> {
        (**self).remove(id)
    }

    fn list(&self) -> Result<Vec<AutomationRule>, RuleStoreError> {
        (**self).list()
    }

    fn enabled_in_priority_order(&self) -> Result<Vec<AutomationRule>, RuleStoreError> {
        (**self).enabled_in_priority_order()
    }

    fn record_outcome(
        &self,
        id: &RuleId,
        fired: bool,
        had_error: bool,
        at: DateTime<Utc>,
    ) -> Result<RuleStats, RuleStoreError> {
        (**self).record_outcome(id, fired, had_error, at)
    }

    fn reset_success_rate(&self, id: &RuleId) -> Result<RuleStats, RuleStoreError> {
        (**self).reset_success_rate(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Condition, ConditionKind, Operator};

    fn rule(id: &str, priority: i32) -> AutomationRule {
        AutomationRule::new(id, id).with_priority(priority)
    }

    #[test]
    fn add_get_and_duplicate() {
        let store = InMemoryRuleStore::new();
        store.add(rule("a", 0)).unwrap();

        assert_eq!(store.get(&RuleId::from("a")).unwrap().name, "a");
        assert_eq!(
            store.add(rule("a", 1)),
            Err(RuleStoreError::DuplicateRuleId(RuleId::from("a")))
        );
        assert_eq!(
            store.get(&RuleId::from("b")),
            Err(RuleStoreError::RuleNotFound(RuleId::from("b")))
        );
    }

    #[test]
    fn add_discards_incoming_stats() {
        let store = InMemoryRuleStore::new();
        let mut r = rule("a", 0);
        r.stats.execution_count = 42;
        r.stats.success_rate = 0.1;

        let stored = store.add(r).unwrap();
        assert_eq!(stored.stats, RuleStats::default());
    }

    #[test]
    fn enabled_rules_sorted_by_priority_then_id() {
        let store = InMemoryRuleStore::new();
        store.add(rule("c", 1)).unwrap();
        store.add(rule("b", 1)).unwrap();
        store.add(rule("z", -5)).unwrap();
        store.add(rule("a", 2).disabled()).unwrap();

        let order: Vec<_> = store
            .enabled_in_priority_order()
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(order, vec!["z", "b", "c"]);
    }

    #[test]
    fn update_merges_and_validates() {
        let store = InMemoryRuleStore::new();
        store.add(rule("a", 0)).unwrap();
        store
            .record_outcome(&RuleId::from("a"), true, false, Utc::now())
            .unwrap();

        let updated = store
            .update(
                &RuleId::from("a"),
                RulePatch {
                    priority: Some(7),
                    ..RulePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.priority, 7);
        assert_eq!(updated.stats.execution_count, 1);

        let bad = RulePatch {
            conditions: Some(vec![Condition::new(
                ConditionKind::Pattern,
                "notes",
                Operator::Regex,
                "[",
            )]),
            ..RulePatch::default()
        };
        assert!(matches!(
            store.update(&RuleId::from("a"), bad),
            Err(RuleStoreError::InvalidRule { .. })
        ));
        assert_eq!(store.get(&RuleId::from("a")).unwrap().priority, 7);

        assert!(matches!(
            store.update(&RuleId::from("missing"), RulePatch::enabled(false)),
            Err(RuleStoreError::RuleNotFound(_))
        ));
    }

    #[test]
    fn record_outcome_and_reset() {
        let store = InMemoryRuleStore::new();
        let id = RuleId::from("a");
        store.add(rule("a", 0)).unwrap();

        let stats = store.record_outcome(&id, true, true, Utc::now()).unwrap();
        assert_eq!(stats.execution_count, 1);
        assert!((stats.success_rate - 0.99).abs() < 1e-12);
        assert!(stats.last_executed_at.is_some());

        let stats = store.record_outcome(&id, false, true, Utc::now()).unwrap();
        assert_eq!(stats.execution_count, 1);
        assert!((stats.success_rate - 0.98).abs() < 1e-12);

        assert_eq!(store.reset_success_rate(&id).unwrap().success_rate, 1.0);
    }

    #[test]
    fn remove_returns_rule() {
        let store = InMemoryRuleStore::arc();
        store.add(rule("a", 0)).unwrap();
        assert_eq!(store.remove(&RuleId::from("a")).unwrap().id, RuleId::from("a"));
        assert!(store.list().unwrap().is_empty());
    }
}
