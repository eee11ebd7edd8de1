//! Model registry: owns model metadata and lifecycle.
//!
//! ## Locking
//!
//! - The outer map lock is held only to look up or insert entries.
//! - Each model sits behind its own `RwLock`; every status change takes the
//!   write lock, so transitions for one model are serialized while other
//!   models (and readers of this one) proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use siteops_core::ModelId;

use crate::model::{Model, ModelStatus};
use crate::result::AiError;

type Entry = Arc<RwLock<Model>>;

/// In-process model registry.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<ModelId, Entry>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn entry(&self, id: &ModelId) -> Result<Entry, AiError> {
        read(&self.models)
            .get(id)
            .cloned()
            .ok_or_else(|| AiError::ModelNotFound(id.clone()))
    }

    /// Register a new model. Fails with `DuplicateModelId` if the id exists.
    pub fn register(&self, model: Model) -> Result<(), AiError> {
        model.validate()?;

        let mut models = write(&self.models);
        if models.contains_key(&model.id) {
            return Err(AiError::DuplicateModelId(model.id));
        }
        info!(model = %model.id, kind = %model.kind(), status = %model.status, "model registered");
        models.insert(model.id.clone(), Arc::new(RwLock::new(model)));
        Ok(())
    }

    /// Snapshot of a model.
    pub fn get(&self, id: &ModelId) -> Result<Model, AiError> {
        let entry = self.entry(id)?;
        let model = read(&entry).clone();
        Ok(model)
    }

    /// Snapshot of every model, sorted by id.
    pub fn list(&self) -> Vec<Model> {
        let entries: Vec<Entry> = read(&self.models).values().cloned().collect();
        let mut models: Vec<Model> = entries.iter().map(|e| read(e).clone()).collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    /// Ids of models currently in `status`.
    pub fn ids_with_status(&self, status: ModelStatus) -> Vec<ModelId> {
        self.list()
            .into_iter()
            .filter(|m| m.status == status)
            .map(|m| m.id)
            .collect()
    }

    /// Move a model along an allowed lifecycle edge.
    pub fn transition(&self, id: &ModelId, next: ModelStatus) -> Result<Model, AiError> {
        let entry = self.entry(id)?;
        let mut model = write(&entry);

        if !model.status.can_transition_to(next) {
            return Err(AiError::InvalidStatusTransition {
                id: id.clone(),
                from: model.status,
                to: next,
            });
        }

        debug!(model = %id, from = %model.status, to = %next, "model status transition");
        model.status = next;
        model.updated_at = Utc::now();
        Ok(model.clone())
    }

    /// Finish an update started with `transition(id, Updating)`.
    ///
    /// `apply` runs on a copy under the model's write lock. On success the copy
    /// is committed and the model returns to `ready`; on failure the model is
    /// still forced back to `ready` with its previous state (fail-open) and the
    /// error is returned. Models that are no longer `updating` (e.g. deprecated
    /// meanwhile) are left untouched.
    pub fn finish_update<F>(&self, id: &ModelId, apply: F) -> Result<Model, AiError>
    where
        F: FnOnce(&mut Model) -> Result<(), AiError>,
    {
        let entry = self.entry(id)?;
        let mut model = write(&entry);

        if model.status != ModelStatus::Updating {
            return Err(AiError::InvalidStatusTransition {
                id: id.clone(),
                from: model.status,
                to: ModelStatus::Ready,
            });
        }

        let mut updated = model.clone();
        let outcome = apply(&mut updated).and_then(|()| {
            updated.id = model.id.clone();
            updated.validate()
        });

        match outcome {
            Ok(()) => {
                updated.status = ModelStatus::Ready;
                updated.updated_at = Utc::now();
                *model = updated;
                Ok(model.clone())
            }
            Err(e) => {
                model.status = ModelStatus::Ready;
                model.updated_at = Utc::now();
                Err(e)
            }
        }
    }

    /// `ready -> updating`, then [`finish_update`](Self::finish_update) with `apply`.
    ///
    /// A model that is not `ready` fails with `InvalidStatusTransition { to: Updating }`
    /// and is not touched.
    pub fn retrain<F>(&self, id: &ModelId, apply: F) -> Result<Model, AiError>
    where
        F: FnOnce(&mut Model) -> Result<(), AiError>,
    {
        self.transition(id, ModelStatus::Updating)?;
        self.finish_update(id, apply)
    }

    pub fn len(&self) -> usize {
        read(&self.models).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
