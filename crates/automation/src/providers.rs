//! Reference signal provider and action sinks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use siteops_core::SubjectId;

use crate::action::{ActionError, ActionSink};
use crate::condition::{SignalError, SignalProvider};
use crate::rule::{ActionKind, Parameters, SignalValue};

/// Most recent reads kept by a provider built with
/// [`InMemorySignalProvider::with_read_log`].
pub const READ_LOG_CAPACITY: usize = 1024;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct SignalState {
    values: HashMap<SubjectId, HashMap<String, SignalValue>>,
    confidence: HashMap<SubjectId, HashMap<String, f64>>,
    reads: Option<VecDeque<String>>,
    last_window: Option<Duration>,
}

/// Signal values held in memory, set by callers (tests, the HTTP surface).
///
/// Windows are accepted but not applied: the stored value is already the
/// aggregate the caller wants compared. Reads are only logged when enabled
/// with [`with_read_log`](Self::with_read_log).
#[derive(Debug, Default)]
pub struct InMemorySignalProvider {
    state: Mutex<SignalState>,
}

impl InMemorySignalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the last [`READ_LOG_CAPACITY`] fields read.
    pub fn with_read_log(self) -> Self {
        lock(&self.state).reads = Some(VecDeque::new());
        self
    }

    pub fn set(&self, subject: &SubjectId, field: impl Into<String>, value: impl Into<SignalValue>) {
        lock(&self.state)
            .values
            .entry(subject.clone())
            .or_default()
            .insert(field.into(), value.into());
    }

    /// Merge several values for a subject at once.
    pub fn extend<I, K>(&self, subject: &SubjectId, values: I)
    where
        I: IntoIterator<Item = (K, SignalValue)>,
        K: Into<String>,
    {
        let mut state = lock(&self.state);
        let entry = state.values.entry(subject.clone()).or_default();
        for (field, value) in values {
            entry.insert(field.into(), value);
        }
    }

    pub fn set_confidence(&self, subject: &SubjectId, field: impl Into<String>, confidence: f64) {
        lock(&self.state)
            .confidence
            .entry(subject.clone())
            .or_default()
            .insert(field.into(), confidence);
    }

    /// Drop every value and confidence recorded for `subject`.
    pub fn clear(&self, subject: &SubjectId) {
        let mut state = lock(&self.state);
        state.values.remove(subject);
        state.confidence.remove(subject);
    }

    pub fn values(&self, subject: &SubjectId) -> HashMap<String, SignalValue> {
        lock(&self.state).values.get(subject).cloned().unwrap_or_default()
    }

    /// Logged reads, oldest first. Empty unless the read log is enabled.
    pub fn reads(&self) -> Vec<String> {
        lock(&self.state)
            .reads
            .as_ref()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_window(&self) -> Option<Duration> {
        lock(&self.state).last_window
    }
}

#[async_trait]
impl SignalProvider for InMemorySignalProvider {
    async fn get_value(
        &self,
        subject: &SubjectId,
        field: &str,
        window: Option<Duration>,
    ) -> Result<SignalValue, SignalError> {
        let mut state = lock(&self.state);
        if let Some(log) = state.reads.as_mut() {
            if log.len() == READ_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(field.to_string());
        }
        state.last_window = window;

        state
            .values
            .get(subject)
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or_else(|| SignalError::Missing {
                subject: subject.clone(),
                field: field.to_string(),
            })
    }

    async fn confidence(&self, subject: &SubjectId, field: &str) -> Option<f64> {
        lock(&self.state)
            .confidence
            .get(subject)
            .and_then(|fields| fields.get(field))
            .copied()
    }
}

/// A call observed by [`RecordingActionSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub kind: ActionKind,
    pub target: String,
    pub parameters: Parameters,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<RecordedCall>,
    /// target -> remaining failures (`None` = always fail)
    failures: HashMap<String, Option<u32>>,
}

/// Records every call; fails on demand per target.
#[derive(Debug, Default)]
pub struct RecordingActionSink {
    state: Mutex<RecordingState>,
}

impl RecordingActionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `target` fails.
    pub fn fail_target(&self, target: impl Into<String>) {
        lock(&self.state).failures.insert(target.into(), None);
    }

    /// The next `times` calls to `target` fail.
    pub fn fail_times(&self, target: impl Into<String>, times: u32) {
        lock(&self.state).failures.insert(target.into(), Some(times));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_to(&self, target: &str) -> usize {
        lock(&self.state).calls.iter().filter(|c| c.target == target).count()
    }
}

#[async_trait]
impl ActionSink for RecordingActionSink {
    async fn perform(&self, kind: ActionKind, target: &str, parameters: &Parameters) -> Result<(), ActionError> {
        let mut state = lock(&self.state);
        state.calls.push(RecordedCall {
            kind,
            target: target.to_string(),
            parameters: parameters.clone(),
        });

        match state.failures.get_mut(target) {
            Some(None) => Err(ActionError::failed(format!("{target} rejected {kind}"))),
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(ActionError::failed(format!("{target} rejected {kind}")))
            }
            _ => Ok(()),
        }
    }
}

/// Logs each action and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActionSink;

#[async_trait]
impl ActionSink for LoggingActionSink {
    async fn perform(&self, kind: ActionKind, target: &str, parameters: &Parameters) -> Result<(), ActionError> {
        info!(%kind, action_target = %target, parameters = %serde_json::Value::Object(parameters.clone()), "action");
        Ok(())
    }
}
