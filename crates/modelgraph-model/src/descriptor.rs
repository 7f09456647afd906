//! Per-type property descriptors: validation records, coercions, post-set
//! actions, recording flag and declared dependencies.
//!
//! Descriptors are configured once inside `ModelType::describe` and shared by
//! every instance of the model type afterwards.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use modelgraph_core::{ValidationKind, ValidationResult, ValidationResultCollection, Validator};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::Model;

/// Values storable in a scalar property.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static {}

impl<T> PropertyValue for T where T: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static {}

/// Items storable in a collection property.
pub trait CollectionItem: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> CollectionItem for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Scalar,
    Collection,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Scalar => f.write_str("scalar"),
            PropertyKind::Collection => f.write_str("collection"),
        }
    }
}

/// When a validation record runs relative to coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValidationPhase {
    /// Sees the raw incoming value.
    BeforeCoerce,
    /// Sees the coerced value.
    #[default]
    AfterCoerce,
    Both,
}

impl ValidationPhase {
    pub fn runs_before_coerce(self) -> bool {
        matches!(self, ValidationPhase::BeforeCoerce | ValidationPhase::Both)
    }

    pub fn runs_after_coerce(self) -> bool {
        matches!(self, ValidationPhase::AfterCoerce | ValidationPhase::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// When false, a failure aborts the pipeline before anything is stored.
    pub continue_on_error: bool,
    /// When true, a failure still lets the change be notified.
    pub notify_on_error: bool,
    pub phase: ValidationPhase,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            notify_on_error: true,
            phase: ValidationPhase::AfterCoerce,
        }
    }
}

impl ValidationOptions {
    pub fn stop_on_error(mut self) -> Self {
        self.continue_on_error = false;
        self
    }

    pub fn suppress_notify_on_error(mut self) -> Self {
        self.notify_on_error = false;
        self
    }

    pub fn before_coerce(mut self) -> Self {
        self.phase = ValidationPhase::BeforeCoerce;
        self
    }

    pub fn after_coerce(mut self) -> Self {
        self.phase = ValidationPhase::AfterCoerce;
        self
    }

    pub fn both_phases(mut self) -> Self {
        self.phase = ValidationPhase::Both;
        self
    }
}

pub type ValidateFn<M, V> =
    dyn Fn(&Model<M>, &V, &mut ValidationResultCollection) -> anyhow::Result<()> + Send + Sync;

/// One validation rule plus its pipeline options.
pub struct ValidationRecord<M, V: ?Sized> {
    validate: Arc<ValidateFn<M, V>>,
    pub options: ValidationOptions,
}

impl<M, V: ?Sized> Clone for ValidationRecord<M, V> {
    fn clone(&self) -> Self {
        Self {
            validate: Arc::clone(&self.validate),
            options: self.options,
        }
    }
}

impl<M, V: ?Sized> fmt::Debug for ValidationRecord<M, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRecord")
            .field("options", &self.options)
            .finish()
    }
}

impl<M, V: ?Sized> ValidationRecord<M, V> {
    pub fn new<F>(validate: F, options: ValidationOptions) -> Self
    where
        F: Fn(&Model<M>, &V, &mut ValidationResultCollection) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self {
            validate: Arc::new(validate),
            options,
        }
    }

    /// Runs the rule, appending its results to `results`. Returns true when it failed.
    ///
    /// A rule fails when it adds an `Error` result or returns `Err`; an `Err` is
    /// turned into an `Error` result carrying the cause.
    pub(crate) fn run(
        &self,
        model: &Model<M>,
        property: &str,
        value: &V,
        results: &mut ValidationResultCollection,
    ) -> bool {
        let mut local = ValidationResultCollection::new();
        let failed = match (self.validate)(model, value, &mut local) {
            Ok(()) => !local.is_succeeded(),
            Err(err) => {
                warn!(property, error = %err, "validator returned an error");
                local.push(ValidationResult::from_failure(err));
                true
            }
        };
        results.extend(local);
        failed
    }
}

fn condition_record<M: 'static, V, C>(
    condition: C,
    kind: ValidationKind,
    message: String,
    options: ValidationOptions,
) -> ValidationRecord<M, V>
where
    V: ?Sized + 'static,
    C: Fn(&Model<M>, &V) -> bool + Send + Sync + 'static,
{
    ValidationRecord::new(
        move |model: &Model<M>, value: &V, results: &mut ValidationResultCollection| {
            results.validate(condition(model, value), message.clone(), kind);
            Ok(())
        },
        options,
    )
}

fn validator_record<M: 'static, V, R>(
    validator: R,
    kind: ValidationKind,
    message: Option<String>,
) -> ValidationRecord<M, V>
where
    V: ?Sized + 'static,
    R: Validator<V> + 'static,
{
    ValidationRecord::new(
        move |_: &Model<M>, value: &V, results: &mut ValidationResultCollection| {
            results.validate_using(&validator, value, message.as_deref(), kind);
            Ok(())
        },
        ValidationOptions::default(),
    )
}

pub(crate) type CoerceFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
pub(crate) type SetterFn<M, T> = Arc<dyn Fn(&Model<M>, &T) + Send + Sync>;
pub(crate) type ChangedFn<M, T> = Arc<dyn Fn(&Model<M>, &[T]) + Send + Sync>;

/// Rules for one scalar property of a model type.
pub struct PropertyDescriptor<M, T> {
    name: String,
    pub(crate) validations: Vec<ValidationRecord<M, T>>,
    pub(crate) coercions: Vec<CoerceFn<T>>,
    pub(crate) setters: Vec<SetterFn<M, T>>,
    recording_enabled: bool,
    dependencies: Vec<String>,
}

impl<M, T> fmt::Debug for PropertyDescriptor<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("validations", &self.validations.len())
            .field("coercions", &self.coercions.len())
            .field("setters", &self.setters.len())
            .field("recording_enabled", &self.recording_enabled)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl<M: 'static, T: 'static> PropertyDescriptor<M, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validations: Vec::new(),
            coercions: Vec::new(),
            setters: Vec::new(),
            recording_enabled: false,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled
    }

    /// Properties this one is re-notified for.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn validations(&self) -> &[ValidationRecord<M, T>] {
        &self.validations
    }

    pub fn validate<F>(&mut self, validate: F) -> &mut Self
    where
        F: Fn(&Model<M>, &T, &mut ValidationResultCollection) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.validate_with(validate, ValidationOptions::default())
    }

    pub fn validate_with<F>(&mut self, validate: F, options: ValidationOptions) -> &mut Self
    where
        F: Fn(&Model<M>, &T, &mut ValidationResultCollection) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.validations.push(ValidationRecord::new(validate, options));
        self
    }

    /// Adds a `kind` result with `message` whenever `condition` holds.
    pub fn check<C>(&mut self, condition: C, kind: ValidationKind, message: impl Into<String>) -> &mut Self
    where
        C: Fn(&Model<M>, &T) -> bool + Send + Sync + 'static,
    {
        self.check_with(condition, kind, message, ValidationOptions::default())
    }

    pub fn check_with<C>(
        &mut self,
        condition: C,
        kind: ValidationKind,
        message: impl Into<String>,
        options: ValidationOptions,
    ) -> &mut Self
    where
        C: Fn(&Model<M>, &T) -> bool + Send + Sync + 'static,
    {
        self.validations
            .push(condition_record(condition, kind, message.into(), options));
        self
    }

    pub fn validate_using<R>(&mut self, validator: R, kind: ValidationKind, message: Option<&str>) -> &mut Self
    where
        R: Validator<T> + 'static,
    {
        self.validations
            .push(validator_record(validator, kind, message.map(str::to_string)));
        self
    }

    /// Coercions run in registration order, each fed the previous output.
    pub fn coerce<F>(&mut self, coerce: F) -> &mut Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.coercions.push(Arc::new(coerce));
        self
    }

    /// Action run after every stored change.
    pub fn on_set<F>(&mut self, action: F) -> &mut Self
    where
        F: Fn(&Model<M>, &T) + Send + Sync + 'static,
    {
        self.setters.push(Arc::new(action));
        self
    }

    pub fn enable_recording(&mut self) -> &mut Self {
        self.recording_enabled = true;
        self
    }

    /// Re-notify this property whenever any of `sources` changes.
    pub fn depend_on(&mut self, sources: &[&str]) -> &mut Self {
        push_unique(&mut self.dependencies, sources);
        self
    }
}

/// Rules for one collection property, evaluated against the whole collection.
pub struct CollectionDescriptor<M, T> {
    name: String,
    pub(crate) validations: Vec<ValidationRecord<M, [T]>>,
    pub(crate) on_changed: Vec<ChangedFn<M, T>>,
    recording_enabled: bool,
    dependencies: Vec<String>,
}

impl<M, T> fmt::Debug for CollectionDescriptor<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDescriptor")
            .field("name", &self.name)
            .field("validations", &self.validations.len())
            .field("on_changed", &self.on_changed.len())
            .field("recording_enabled", &self.recording_enabled)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl<M: 'static, T: 'static> CollectionDescriptor<M, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validations: Vec::new(),
            on_changed: Vec::new(),
            recording_enabled: false,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn validate<F>(&mut self, validate: F) -> &mut Self
    where
        F: Fn(&Model<M>, &[T], &mut ValidationResultCollection) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.validate_with(validate, ValidationOptions::default())
    }

    /// The phase in `options` is ignored; collection rules run once per change.
    pub fn validate_with<F>(&mut self, validate: F, options: ValidationOptions) -> &mut Self
    where
        F: Fn(&Model<M>, &[T], &mut ValidationResultCollection) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.validations.push(ValidationRecord::new(validate, options));
        self
    }

    pub fn check<C>(&mut self, condition: C, kind: ValidationKind, message: impl Into<String>) -> &mut Self
    where
        C: Fn(&Model<M>, &[T]) -> bool + Send + Sync + 'static,
    {
        self.check_with(condition, kind, message, ValidationOptions::default())
    }

    pub fn check_with<C>(
        &mut self,
        condition: C,
        kind: ValidationKind,
        message: impl Into<String>,
        options: ValidationOptions,
    ) -> &mut Self
    where
        C: Fn(&Model<M>, &[T]) -> bool + Send + Sync + 'static,
    {
        self.validations
            .push(condition_record(condition, kind, message.into(), options));
        self
    }

    pub fn validate_using<R>(&mut self, validator: R, kind: ValidationKind, message: Option<&str>) -> &mut Self
    where
        R: Validator<[T]> + 'static,
    {
        self.validations
            .push(validator_record(validator, kind, message.map(str::to_string)));
        self
    }

    /// Callback run with the current items after every accepted change.
    pub fn on_changed<F>(&mut self, action: F) -> &mut Self
    where
        F: Fn(&Model<M>, &[T]) + Send + Sync + 'static,
    {
        self.on_changed.push(Arc::new(action));
        self
    }

    pub fn enable_recording(&mut self) -> &mut Self {
        self.recording_enabled = true;
        self
    }

    pub fn depend_on(&mut self, sources: &[&str]) -> &mut Self {
        push_unique(&mut self.dependencies, sources);
        self
    }
}

fn push_unique(target: &mut Vec<String>, sources: &[&str]) {
    for source in sources {
        if !target.iter().any(|s| s == source) {
            target.push(source.to_string());
        }
    }
}

/// Descriptor seen without its value type, used while a type is being described.
pub(crate) trait ErasedDescriptor: Send + Sync {
    fn dependencies(&self) -> &[String];
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: 'static, T: Send + Sync + 'static> ErasedDescriptor for PropertyDescriptor<M, T> {
    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::from(self as Box<dyn Any + Send + Sync>)
    }
}

impl<M: 'static, T: Send + Sync + 'static> ErasedDescriptor for CollectionDescriptor<M, T> {
    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_shared(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::from(self as Box<dyn Any + Send + Sync>)
    }
}
