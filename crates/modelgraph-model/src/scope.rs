//! Edit scopes: transactional recording of property changes with undo/redo.
//!
//! A scope begun while another scope of the same model is running becomes its
//! child. Only root scopes enter the journal; a child hands its records to its
//! parent when it finishes, and the root notifies once when it commits.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::record::ChangeRecord;
use crate::registry::ModelType;

/// Body of a scope. Mutations it makes on recording-enabled properties are captured.
pub type ScopeAction<M> = Box<dyn FnOnce(&Model<M>, &Scope<M>) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeState {
    Pending,
    Committed,
    Failed,
}

struct ScopeStatus {
    state: ScopeState,
    running: bool,
    /// False once undone, true again after redo.
    applied: bool,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

struct ScopeInner<M> {
    id: Uuid,
    model: Weak<Model<M>>,
    parent: Option<Scope<M>>,
    action: Mutex<Option<ScopeAction<M>>>,
    records: Mutex<Vec<Arc<dyn ChangeRecord<M>>>>,
    status: Mutex<ScopeStatus>,
}

/// Handle to an edit scope. Clones refer to the same scope.
pub struct Scope<M> {
    inner: Arc<ScopeInner<M>>,
}

impl<M> Clone for Scope<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> PartialEq for Scope<M> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<M> fmt::Debug for Scope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.status.lock();
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("root", &self.inner.parent.is_none())
            .field("state", &status.state)
            .field("applied", &status.applied)
            .field("records", &self.inner.records.lock().len())
            .finish()
    }
}

impl<M: ModelType> Scope<M> {
    pub(crate) fn new(model: Weak<Model<M>>, parent: Option<Scope<M>>, action: ScopeAction<M>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                model,
                parent,
                action: Mutex::new(Some(action)),
                records: Mutex::new(Vec::new()),
                status: Mutex::new(ScopeStatus {
                    state: ScopeState::Pending,
                    running: false,
                    applied: false,
                    started_at: None,
                    completed_at: None,
                    failure: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> ScopeState {
        self.inner.status.lock().state
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn parent(&self) -> Option<Scope<M>> {
        self.inner.parent.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.status.lock().running
    }

    /// Whether the scope's changes are currently in effect.
    pub fn is_applied(&self) -> bool {
        self.inner.status.lock().applied
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.status.lock().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.inner.status.lock().completed_at
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.status.lock().failure.clone()
    }

    pub fn records_len(&self) -> usize {
        self.inner.records.lock().len()
    }

    /// Recorded property names without duplicates, in first-recorded order.
    pub fn recorded_properties(&self) -> Vec<String> {
        let records = self.inner.records.lock();
        let mut names: Vec<String> = Vec::new();
        for record in records.iter() {
            if !names.iter().any(|n| n == record.property()) {
                names.push(record.property().to_string());
            }
        }
        names
    }

    pub(crate) fn record(&self, record: Arc<dyn ChangeRecord<M>>) {
        self.inner.records.lock().push(record);
    }

    fn model(&self) -> Result<Arc<Model<M>>> {
        self.inner.model.upgrade().ok_or(ModelError::ModelDropped)
    }

    /// Runs the scope body. A scope runs at most once.
    ///
    /// A failing body leaves its changes applied and recorded (so the scope
    /// can still be undone) and returns the failure.
    pub fn run(&self) -> Result<()> {
        let model = self.model()?;
        let action = self
            .inner
            .action
            .lock()
            .take()
            .ok_or(ModelError::ScopeAlreadyStarted(self.inner.id))?;

        {
            let mut status = self.inner.status.lock();
            status.running = true;
            status.started_at = Some(Utc::now());
        }
        debug!(scope = %self.inner.id, root = self.is_root(), "scope started");

        let outcome = {
            let _running = model.enter_scope(self.clone());
            action(model.as_ref(), self)
        };

        let committed = outcome.is_ok();
        {
            let mut status = self.inner.status.lock();
            status.running = false;
            status.applied = true;
            status.completed_at = Some(Utc::now());
            status.state = if committed {
                ScopeState::Committed
            } else {
                ScopeState::Failed
            };
            if let Err(err) = &outcome {
                status.failure = Some(err.to_string());
            }
        }

        match &self.inner.parent {
            Some(parent) => {
                let records = self.inner.records.lock().clone();
                parent.inner.records.lock().extend(records);
                if committed && !parent.is_running() {
                    // The parent already finished, so nobody else will notify.
                    model.notify(&self.recorded_properties());
                }
            }
            None if committed => {
                let names = self.recorded_properties();
                debug!(scope = %self.inner.id, properties = names.len(), "scope committed");
                model.notify(&names);
            }
            None => {
                warn!(scope = %self.inner.id, failure = ?self.failure(), "scope failed");
            }
        }

        outcome.map_err(ModelError::Action)
    }

    fn ensure_replayable(&self, operation: &str) -> Result<()> {
        if !self.is_root() {
            return Err(ModelError::StructuralUsage(format!(
                "cannot {} child scope {}; undo or redo its root scope instead",
                operation, self.inner.id
            )));
        }
        if self.is_running() {
            return Err(ModelError::StructuralUsage(format!(
                "cannot {} scope {} while it is running",
                operation, self.inner.id
            )));
        }
        Ok(())
    }

    /// Reverts every recorded change, newest first. No-op when not applied.
    pub fn undo(&self) -> Result<()> {
        self.replay(false)
    }

    /// Re-applies every recorded change in original order. No-op when applied.
    pub fn redo(&self) -> Result<()> {
        self.replay(true)
    }

    /// Moves the scope to `apply` (true for redo). When a record fails, the
    /// records already replayed are rolled back and the scope keeps its
    /// previous applied state.
    fn replay(&self, apply: bool) -> Result<()> {
        let operation = if apply { "redo" } else { "undo" };
        self.ensure_replayable(operation)?;
        let model = self.model()?;
        {
            let mut status = self.inner.status.lock();
            if status.state == ScopeState::Pending || status.applied == apply {
                return Ok(());
            }
            status.applied = apply;
        }

        let mut records = self.inner.records.lock().clone();
        if !apply {
            records.reverse();
        }
        debug!(scope = %self.inner.id, records = records.len(), operation, "replaying scope");

        let _replay = model.enter_replay();
        let step = |record: &Arc<dyn ChangeRecord<M>>, forward: bool| {
            if forward {
                record.redo(&model)
            } else {
                record.undo(&model)
            }
        };
        for (done, record) in records.iter().enumerate() {
            if let Err(err) = step(record, apply) {
                warn!(scope = %self.inner.id, operation, error = %err, "replay failed, rolling back");
                for replayed in records[..done].iter().rev() {
                    if let Err(rollback) = step(replayed, !apply) {
                        warn!(scope = %self.inner.id, error = %rollback, "rollback step failed");
                    }
                }
                self.inner.status.lock().applied = !apply;
                return Err(err);
            }
        }
        Ok(())
    }

    /// `run` marshalled through the model's dispatcher.
    pub async fn start(&self) -> Result<()> {
        let model = self.model()?;
        let scope = self.clone();
        model.dispatch(move || scope.run()).await
    }

    pub async fn undo_async(&self) -> Result<()> {
        let model = self.model()?;
        let scope = self.clone();
        model.dispatch(move || scope.undo()).await
    }

    pub async fn redo_async(&self) -> Result<()> {
        let model = self.model()?;
        let scope = self.clone();
        model.dispatch(move || scope.redo()).await
    }
}
