//! Scalar property storage and the validate, coerce, assign, notify pipeline.

use std::any::{type_name, Any};
use std::sync::Arc;

use modelgraph_core::{ObservableList, ValidationResultCollection};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::descriptor::{CollectionItem, PropertyDescriptor, PropertyKind, PropertyValue};
use crate::error::{ModelError, Result};
use crate::model::{ErrorsChanged, Model};
use crate::record::{ChangeRecord, PropertyChangeRecord};
use crate::registry::ModelType;

pub(crate) struct ScalarState<T> {
    pub(crate) value: T,
    pub(crate) previous: T,
}

/// Per-instance storage of one property: its value and last validation results.
pub(crate) struct Slot {
    pub(crate) kind: PropertyKind,
    value_type: &'static str,
    state: Mutex<Box<dyn Any + Send + Sync>>,
    results: Mutex<ValidationResultCollection>,
}

impl Slot {
    pub(crate) fn scalar<T: PropertyValue>() -> Self {
        Self {
            kind: PropertyKind::Scalar,
            value_type: type_name::<T>(),
            state: Mutex::new(Box::new(ScalarState {
                value: T::default(),
                previous: T::default(),
            })),
            results: Mutex::new(ValidationResultCollection::new()),
        }
    }

    pub(crate) fn collection<T: CollectionItem>() -> Self {
        Self {
            kind: PropertyKind::Collection,
            value_type: type_name::<T>(),
            state: Mutex::new(Box::new(ObservableList::<T>::new())),
            results: Mutex::new(ValidationResultCollection::new()),
        }
    }

    /// Runs `f` on the stored state. The lock is held only for `f`.
    pub(crate) fn with_state<S: 'static, R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut guard = self.state.lock();
        let state: &mut (dyn Any + Send + Sync) = &mut **guard;
        state.downcast_mut::<S>().map(f)
    }

    pub(crate) fn typed<M: ModelType, S: 'static, R>(
        &self,
        property: &str,
        f: impl FnOnce(&mut S) -> R,
    ) -> Result<R> {
        self.with_state(f).ok_or_else(|| ModelError::TypeMismatch {
            model: M::NAME,
            property: property.to_string(),
            expected: type_name::<S>(),
            found: self.value_type,
        })
    }

    pub(crate) fn results(&self) -> ValidationResultCollection {
        self.results.lock().clone()
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.results.lock().is_succeeded()
    }

    pub(crate) fn replace_results(&self, results: ValidationResultCollection) {
        *self.results.lock() = results;
    }

    pub(crate) fn with_results<R>(&self, f: impl FnOnce(&mut ValidationResultCollection) -> R) -> R {
        f(&mut self.results.lock())
    }
}

impl<M: ModelType> Model<M> {
    /// Current value of scalar property `name`, or `T::default()` if never set.
    pub fn get<T: PropertyValue>(&self, name: &str) -> Result<T> {
        self.metadata().descriptor::<T>(name)?;
        match self.existing_slot(name) {
            Some(slot) => slot.typed::<M, ScalarState<T>, _>(name, |s| s.value.clone()),
            None => Ok(T::default()),
        }
    }

    /// Value held before the last stored change.
    pub fn previous<T: PropertyValue>(&self, name: &str) -> Result<T> {
        self.metadata().descriptor::<T>(name)?;
        match self.existing_slot(name) {
            Some(slot) => slot.typed::<M, ScalarState<T>, _>(name, |s| s.previous.clone()),
            None => Ok(T::default()),
        }
    }

    /// Returns the stored value, first setting `init()` through the pipeline
    /// when the property has never been written.
    pub fn get_or_init<T, F>(&self, name: &str, init: F) -> Result<T>
    where
        T: PropertyValue,
        F: FnOnce() -> T,
    {
        if self.existing_slot(name).is_none() {
            self.set(name, init())?;
        }
        self.get(name)
    }

    /// Runs the property pipeline for `value`. Returns whether the value was stored.
    pub fn set<T: PropertyValue>(&self, name: &str, value: T) -> Result<bool> {
        let descriptor = self.metadata().descriptor::<T>(name)?;
        let slot = self.slot_for(name, Slot::scalar::<T>);
        slot.typed::<M, ScalarState<T>, _>(name, |_| ())?;
        Ok(self.run_pipeline(&descriptor, &slot, value))
    }

    fn run_pipeline<T: PropertyValue>(
        &self,
        descriptor: &PropertyDescriptor<M, T>,
        slot: &Slot,
        value: T,
    ) -> bool {
        let name = descriptor.name();
        let had_errors = slot.has_errors();
        slot.replace_results(ValidationResultCollection::new());
        let mut results = ValidationResultCollection::new();
        let mut notify_anyway = false;

        let mut before_ok = true;
        for record in descriptor
            .validations
            .iter()
            .filter(|r| r.options.phase.runs_before_coerce())
        {
            if record.run(self, name, &value, &mut results) {
                before_ok = false;
                notify_anyway |= record.options.notify_on_error;
                if !record.options.continue_on_error {
                    debug!(property = name, "rejected before coercion");
                    self.finish_pass(name, slot, results, had_errors);
                    return false;
                }
            }
        }

        let coerced = if before_ok {
            descriptor.coercions.iter().fold(value, |v, coerce| coerce(v))
        } else {
            value
        };

        let unchanged = slot
            .with_state::<ScalarState<T>, _>(|s| s.value == coerced)
            .unwrap_or(false);
        if unchanged {
            trace!(property = name, "value unchanged");
            self.finish_pass(name, slot, results, had_errors);
            return false;
        }

        let mut after_ok = true;
        for record in descriptor
            .validations
            .iter()
            .filter(|r| r.options.phase.runs_after_coerce())
        {
            if record.run(self, name, &coerced, &mut results) {
                after_ok = false;
                notify_anyway |= record.options.notify_on_error;
                if !record.options.continue_on_error {
                    debug!(property = name, "rejected after coercion");
                    self.finish_pass(name, slot, results, had_errors);
                    return false;
                }
            }
        }

        let previous = slot
            .with_state::<ScalarState<T>, _>(|s| {
                let old = std::mem::replace(&mut s.value, coerced.clone());
                s.previous = old.clone();
                old
            })
            .unwrap_or_default();

        for action in &descriptor.setters {
            action(self, &coerced);
        }

        self.finish_pass(name, slot, results, had_errors);

        if (before_ok && after_ok) || notify_anyway {
            self.record_or_notify(name, descriptor.recording_enabled(), move || {
                let record: Arc<dyn ChangeRecord<M>> =
                    Arc::new(PropertyChangeRecord::new(name, previous, coerced));
                record
            });
        } else {
            debug!(property = name, "stored with errors, notification suppressed");
        }
        true
    }

    /// Stores the pass results and raises errors-changed when the pass ends
    /// with errors or clears earlier ones.
    pub(crate) fn finish_pass(
        &self,
        name: &str,
        slot: &Slot,
        results: ValidationResultCollection,
        had_errors: bool,
    ) {
        let has_errors = !results.is_succeeded();
        slot.replace_results(results);
        if has_errors || had_errors {
            self.errors_changed().emit(&ErrorsChanged {
                property: name.to_string(),
                has_errors,
            });
        }
    }

    /// Restores a recorded value during undo or redo.
    ///
    /// The value is stored as recorded: coercions and rejecting rules are
    /// skipped so replay cannot fail on rules. Validation results are
    /// refreshed, post-set actions run and the change is notified at once.
    pub(crate) fn replay_value<T: PropertyValue>(&self, name: &str, value: T) -> Result<()> {
        let descriptor = self.metadata().descriptor::<T>(name)?;
        let slot = self.slot_for(name, Slot::scalar::<T>);
        let changed = slot.typed::<M, ScalarState<T>, _>(name, |s| {
            if s.value == value {
                return false;
            }
            s.previous = std::mem::replace(&mut s.value, value.clone());
            true
        })?;
        if !changed {
            return Ok(());
        }

        let had_errors = slot.has_errors();
        let mut results = ValidationResultCollection::new();
        for record in &descriptor.validations {
            record.run(self, name, &value, &mut results);
        }
        self.finish_pass(name, &slot, results, had_errors);

        for action in &descriptor.setters {
            action(self, &value);
        }
        trace!(property = name, "replayed value");
        self.notify(&[name]);
        Ok(())
    }
}
