//! Action execution with delay, retry, rollback and per-call timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use siteops_core::{RuleId, SubjectId};

use crate::rule::{Action, ActionKind, Parameters};

/// Performs side effects on behalf of fired rules.
#[async_trait]
pub trait ActionSink: Send + Sync + 'static {
    async fn perform(&self, kind: ActionKind, target: &str, parameters: &Parameters) -> Result<(), ActionError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),
    #[error("action timed out after {0:?}")]
    Timeout(Duration),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Exponential backoff between retries of a failing action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryBackoff {
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry `attempt` (1-indexed): `base * 2^(attempt-1)`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Outcome of one action chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub performed: usize,
    pub failed: usize,
    pub rolled_back: usize,
}

impl ChainReport {
    pub fn had_error(&self) -> bool {
        self.failed > 0
    }
}

/// Runs action chains against an [`ActionSink`].
pub struct ActionExecutor {
    sink: Arc<dyn ActionSink>,
    io_timeout: Duration,
    backoff: RetryBackoff,
}

impl ActionExecutor {
    pub fn new(sink: Arc<dyn ActionSink>, io_timeout: Duration, backoff: RetryBackoff) -> Self {
        Self {
            sink,
            io_timeout,
            backoff,
        }
    }

    /// Execute `actions` in order. A failed action is rolled back (rollback
    /// errors are logged and dropped) and the chain continues.
    pub async fn run_chain(&self, subject: &SubjectId, rule: &RuleId, actions: &[Action]) -> ChainReport {
        let mut report = ChainReport::default();

        for (index, action) in actions.iter().enumerate() {
            match self.perform(action).await {
                Ok(()) => {
                    report.performed += 1;
                    debug!(subject = %subject, rule = %rule, action = index, kind = %action.kind, "action performed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        subject = %subject,
                        rule = %rule,
                        action = index,
                        kind = %action.kind,
                        action_target = %action.target,
                        error = %e,
                        "action failed"
                    );

                    if let Some(rollback) = &action.rollback {
                        report.rolled_back += 1;
                        if let Err(e) = self.perform(rollback).await {
                            error!(
                                subject = %subject,
                                rule = %rule,
                                action = index,
                                kind = %rollback.kind,
                                error = %e,
                                "rollback failed"
                            );
                        }
                    }
                }
            }
        }

        report
    }

    /// One action: delay, then up to `1 + retry_count` bounded sink calls.
    pub async fn perform(&self, action: &Action) -> Result<(), ActionError> {
        if let Some(delay) = action.delay {
            tokio::time::sleep(delay.as_duration()).await;
        }

        let mut attempt = 0;
        loop {
            match self.call(action).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < action.retry_count => {
                    attempt += 1;
                    let wait = self.backoff.delay_for_attempt(attempt);
                    debug!(kind = %action.kind, action_target = %action.target, attempt, error = %e, ?wait, "retrying action");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call(&self, action: &Action) -> Result<(), ActionError> {
        tokio::time::timeout(
            self.io_timeout,
            self.sink.perform(action.kind, &action.target, &action.parameters),
        )
        .await
        .map_err(|_| ActionError::Timeout(self.io_timeout))?
    }
}
