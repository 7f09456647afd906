//! The per-instance model: property storage, notifications, validation
//! results, commands, and the scope journal.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use modelgraph_core::{
    Journal, ModelGraphConfig, ObserverList, Subscription, ValidationKind, ValidationResult,
    ValidationResultCollection,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::command::{Command, CommandParameter};
use crate::dispatcher::Dispatcher;
use crate::error::{ModelError, Result};
use crate::property::Slot;
use crate::record::ChangeRecord;
use crate::registry::{DescriptorRegistry, ModelType, TypeMetadata};
use crate::scope::{Scope, ScopeState};

/// A property of a model instance changed, directly or through a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChanged {
    pub model_id: Uuid,
    pub property: String,
}

/// The validation state of a property was rebuilt with errors, or its errors cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorsChanged {
    pub property: String,
    pub has_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandExecuted {
    pub command: String,
    pub parameter: CommandParameter,
}

/// One instance of model type `M`.
///
/// Created as `Arc<Model<M>>`. No internal lock is held while validators,
/// actions, observers or commands run, so callbacks may freely read and
/// write other properties of the same instance.
pub struct Model<M> {
    id: Uuid,
    metadata: Arc<TypeMetadata<M>>,
    slots: RwLock<BTreeMap<String, Arc<Slot>>>,
    journal: Mutex<Journal<Scope<M>>>,
    running: Mutex<Vec<Scope<M>>>,
    replay_depth: AtomicUsize,
    commands: RwLock<BTreeMap<String, Arc<Command>>>,
    command_handlers: RwLock<HashMap<String, ObserverList<CommandExecuted>>>,
    property_changed: ObserverList<PropertyChanged>,
    errors_changed: ObserverList<ErrorsChanged>,
    command_executed: ObserverList<CommandExecuted>,
    broadcaster: broadcast::Sender<PropertyChanged>,
    dispatcher: RwLock<Option<Arc<dyn Dispatcher>>>,
    self_ref: Weak<Model<M>>,
}

impl<M: ModelType> fmt::Debug for Model<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &M::NAME)
            .field("id", &self.id)
            .field("properties", &self.slots.read().len())
            .field("commands", &self.commands.read().len())
            .field("journal", &self.journal.lock().len())
            .finish()
    }
}

pub(crate) struct RunningScopeGuard<'a, M> {
    model: &'a Model<M>,
    scope: Scope<M>,
}

impl<M> Drop for RunningScopeGuard<'_, M> {
    fn drop(&mut self) {
        let mut running = self.model.running.lock();
        if let Some(pos) = running.iter().rposition(|s| *s == self.scope) {
            running.remove(pos);
        }
    }
}

pub(crate) struct ReplayGuard<'a, M> {
    model: &'a Model<M>,
}

impl<M> Drop for ReplayGuard<'_, M> {
    fn drop(&mut self) {
        self.model.replay_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<M: ModelType> Model<M> {
    pub fn new(registry: &DescriptorRegistry) -> Result<Arc<Self>> {
        Self::with_config(registry, &ModelGraphConfig::default())
    }

    pub fn with_config(registry: &DescriptorRegistry, config: &ModelGraphConfig) -> Result<Arc<Self>> {
        let metadata = registry.metadata::<M>()?;
        let (broadcaster, _) = broadcast::channel(config.notifications.broadcast_capacity.max(1));
        let max_entries = config.journal.max_entries;

        Ok(Arc::new_cyclic(|self_ref| Model {
            id: Uuid::new_v4(),
            metadata,
            slots: RwLock::new(BTreeMap::new()),
            journal: Mutex::new(Journal::with_capacity_limit(max_entries)),
            running: Mutex::new(Vec::new()),
            replay_depth: AtomicUsize::new(0),
            commands: RwLock::new(BTreeMap::new()),
            command_handlers: RwLock::new(HashMap::new()),
            property_changed: ObserverList::new(),
            errors_changed: ObserverList::new(),
            command_executed: ObserverList::new(),
            broadcaster,
            dispatcher: RwLock::new(None),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        M::NAME
    }

    pub fn metadata(&self) -> &TypeMetadata<M> {
        &self.metadata
    }

    /// Names of the properties this instance has stored, sorted.
    pub fn stored_properties(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    pub(crate) fn existing_slot(&self, name: &str) -> Option<Arc<Slot>> {
        self.slots.read().get(name).cloned()
    }

    pub(crate) fn slot_for(&self, name: &str, make: fn() -> Slot) -> Arc<Slot> {
        if let Some(slot) = self.existing_slot(name) {
            return slot;
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(make())),
        )
    }

    // ----- notifications -----

    pub fn on_property_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PropertyChanged) + Send + Sync + 'static,
    {
        self.property_changed.subscribe(callback)
    }

    pub fn on_errors_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ErrorsChanged) + Send + Sync + 'static,
    {
        self.errors_changed.subscribe(callback)
    }

    pub fn on_command_executed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CommandExecuted) + Send + Sync + 'static,
    {
        self.command_executed.subscribe(callback)
    }

    /// Property-change events for async consumers. Slow receivers lag rather
    /// than block the model.
    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChanged> {
        self.broadcaster.subscribe()
    }

    pub(crate) fn errors_changed(&self) -> &ObserverList<ErrorsChanged> {
        &self.errors_changed
    }

    /// Notifies `changed` and every transitive dependent exactly once, then
    /// invalidates all commands. Returns the notified names in order.
    pub fn notify<S: AsRef<str>>(&self, changed: &[S]) -> Vec<String> {
        if changed.is_empty() {
            return Vec::new();
        }
        let emitted = self.metadata.propagation().propagate(changed, |property| {
            trace!(model = M::NAME, property, "property changed");
            let event = PropertyChanged {
                model_id: self.id,
                property: property.to_string(),
            };
            self.property_changed.emit(&event);
            // No receivers is not an error.
            let _ = self.broadcaster.send(event);
        });
        if !emitted.is_empty() {
            self.invalidate_commands();
        }
        emitted
    }

    /// Records the change in the innermost running scope when recording is
    /// enabled, otherwise notifies at once. Replays always notify.
    pub(crate) fn record_or_notify<F>(&self, name: &str, recording_enabled: bool, make: F)
    where
        F: FnOnce() -> Arc<dyn ChangeRecord<M>>,
    {
        if recording_enabled && !self.is_replaying() {
            let scope = self.running.lock().last().cloned();
            if let Some(scope) = scope {
                trace!(property = name, scope = %scope.id(), "change recorded");
                scope.record(make());
                return;
            }
        }
        self.notify(&[name]);
    }

    pub(crate) fn is_replaying(&self) -> bool {
        self.replay_depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn enter_replay(&self) -> ReplayGuard<'_, M> {
        self.replay_depth.fetch_add(1, Ordering::SeqCst);
        ReplayGuard { model: self }
    }

    pub(crate) fn enter_scope(&self, scope: Scope<M>) -> RunningScopeGuard<'_, M> {
        self.running.lock().push(scope.clone());
        RunningScopeGuard { model: self, scope }
    }

    // ----- validation results -----

    pub fn has_errors(&self) -> bool {
        self.slots.read().values().any(|slot| slot.has_errors())
    }

    /// Results of the last pipeline pass of `name`. Empty if never set.
    pub fn validation_results(&self, name: &str) -> ValidationResultCollection {
        self.existing_slot(name)
            .map(|slot| slot.results())
            .unwrap_or_default()
    }

    /// Non-success results of `name`, or of every property when `None`.
    pub fn get_errors(&self, name: Option<&str>) -> Vec<ValidationResult> {
        let slots: Vec<Arc<Slot>> = match name {
            Some(name) => self.existing_slot(name).into_iter().collect(),
            None => self.slots.read().values().cloned().collect(),
        };
        slots
            .iter()
            .flat_map(|slot| slot.results().non_success().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Drops every stored result. Properties that had errors raise errors-changed.
    pub fn clear_validation_results(&self) {
        let slots: Vec<(String, Arc<Slot>)> = self
            .slots
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        for (name, slot) in slots {
            let had_errors = slot.has_errors();
            slot.replace_results(ValidationResultCollection::new());
            if had_errors {
                self.errors_changed.emit(&ErrorsChanged {
                    property: name,
                    has_errors: false,
                });
            }
        }
    }

    /// Appends a result to `name` outside the pipeline. Returns false when the
    /// property has no stored value yet.
    pub fn add_validation_result(&self, name: &str, message: impl Into<String>, kind: ValidationKind) -> bool {
        let Some(slot) = self.existing_slot(name) else {
            return false;
        };
        slot.with_results(|results| results.add(kind, message));
        self.errors_changed.emit(&ErrorsChanged {
            property: name.to_string(),
            has_errors: slot.has_errors(),
        });
        true
    }

    // ----- commands -----

    pub fn register_command<F>(&self, name: &str, execute: F) -> Arc<Command>
    where
        F: Fn(&Model<M>, &CommandParameter) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let command = self.bind_command(name, execute);
        self.register_command_handle(command)
    }

    pub fn register_guarded_command<F, G>(&self, name: &str, execute: F, can_execute: G) -> Arc<Command>
    where
        F: Fn(&Model<M>, &CommandParameter) -> anyhow::Result<()> + Send + Sync + 'static,
        G: Fn(&Model<M>, &CommandParameter) -> bool + Send + Sync + 'static,
    {
        let model = self.self_ref.clone();
        let command = self.bind_command(name, execute).with_can_execute(move |parameter| {
            model
                .upgrade()
                .map(|model| can_execute(&model, parameter))
                .unwrap_or(false)
        });
        self.register_command_handle(command)
    }

    fn bind_command<F>(&self, name: &str, execute: F) -> Command
    where
        F: Fn(&Model<M>, &CommandParameter) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let model = self.self_ref.clone();
        let command_name = name.to_string();
        Command::new(name, move |parameter| {
            let model = model.upgrade().ok_or(ModelError::ModelDropped)?;
            execute(&model, parameter)?;
            model.command_executed(&command_name, parameter);
            Ok(())
        })
    }

    /// Registers a prebuilt command. It does not raise command-executed on
    /// its own. Replaces any command of the same name.
    pub fn register_command_handle(&self, command: Command) -> Arc<Command> {
        let command = Arc::new(command);
        let previous = self
            .commands
            .write()
            .insert(command.name().to_string(), Arc::clone(&command));
        if previous.is_some() {
            debug!(model = M::NAME, command = command.name(), "command replaced");
        }
        command
    }

    pub fn command(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().get(name).cloned()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    /// Runs command `name`. Returns `Ok(false)` when its guard refuses.
    pub fn execute_command(&self, name: &str, parameter: CommandParameter) -> Result<bool> {
        let command = self
            .command(name)
            .ok_or_else(|| ModelError::CommandNotFound(name.to_string()))?;
        if !command.can_execute(&parameter) {
            debug!(command = name, "command cannot execute");
            return Ok(false);
        }
        command.execute(&parameter)?;
        Ok(true)
    }

    /// Raises command-executed for `name`: model observers first, then the
    /// handlers subscribed to that command.
    pub fn command_executed(&self, name: &str, parameter: &CommandParameter) {
        let event = CommandExecuted {
            command: name.to_string(),
            parameter: parameter.clone(),
        };
        self.command_executed.emit(&event);
        let handlers = self.command_handlers.read().get(name).cloned();
        if let Some(handlers) = handlers {
            handlers.emit(&event);
        }
    }

    pub fn subscribe_to_command<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&CommandExecuted) + Send + Sync + 'static,
    {
        let list = self
            .command_handlers
            .write()
            .entry(name.to_string())
            .or_default()
            .clone();
        list.subscribe(handler)
    }

    pub fn invalidate_commands(&self) {
        let commands: Vec<Arc<Command>> = self.commands.read().values().cloned().collect();
        for command in commands {
            command.invalidate();
        }
    }

    // ----- scopes and journal -----

    /// Creates a scope for `action` without running it.
    ///
    /// While another scope of this model is running the new scope becomes
    /// its child. Otherwise it is a root scope and enters the journal now,
    /// discarding any redo history.
    pub fn begin_scope<F>(&self, action: F) -> Scope<M>
    where
        F: FnOnce(&Model<M>, &Scope<M>) -> anyhow::Result<()> + Send + 'static,
    {
        let parent = self.running_scope();
        self.create_scope(parent, Box::new(action))
    }

    /// Creates a child of `parent`. Children never enter the journal.
    pub fn begin_scope_in<F>(&self, parent: &Scope<M>, action: F) -> Scope<M>
    where
        F: FnOnce(&Model<M>, &Scope<M>) -> anyhow::Result<()> + Send + 'static,
    {
        self.create_scope(Some(parent.clone()), Box::new(action))
    }

    fn create_scope(&self, parent: Option<Scope<M>>, action: crate::scope::ScopeAction<M>) -> Scope<M> {
        let is_child = parent.is_some();
        let scope = Scope::new(self.self_ref.clone(), parent, action);
        if is_child {
            return scope;
        }

        let mut journal = self.journal.lock();
        let expected = journal.position().map(|p| p + 2).unwrap_or(1);
        journal.push(scope.clone());
        if journal.len() < expected {
            warn!(model = M::NAME, limit = journal.len(), "journal full, oldest scope dropped");
        }
        scope
    }

    /// Begins a scope and runs it at once.
    pub fn run_scope<F>(&self, action: F) -> Result<Scope<M>>
    where
        F: FnOnce(&Model<M>, &Scope<M>) -> anyhow::Result<()> + Send + 'static,
    {
        let scope = self.begin_scope(action);
        scope.run()?;
        Ok(scope)
    }

    /// Innermost scope currently running its body.
    pub fn running_scope(&self) -> Option<Scope<M>> {
        self.running.lock().last().cloned()
    }

    /// Journal entry under the pointer.
    pub fn active_scope(&self) -> Option<Scope<M>> {
        self.journal.lock().peek().cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.journal.lock().can_go_back()
    }

    pub fn can_redo(&self) -> bool {
        self.journal.lock().can_go_forward()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.lock().len()
    }

    pub fn journal_position(&self) -> Option<usize> {
        self.journal.lock().position()
    }

    /// Undoes the active journal entry and steps back. No-op with nothing to undo.
    ///
    /// An entry that was begun but never run cannot be stepped over; the
    /// pointer only moves once the entry's undo succeeded.
    pub fn undo(&self) -> Result<()> {
        let Some(scope) = self.active_scope() else {
            trace!(model = M::NAME, "nothing to undo");
            return Ok(());
        };
        if scope.state() == ScopeState::Pending && !scope.is_running() {
            return Err(ModelError::StructuralUsage(format!(
                "scope {} has not run yet; run it before undoing past it",
                scope.id()
            )));
        }
        scope.undo()?;
        self.journal.lock().go_back()?;
        Ok(())
    }

    /// Redoes the next journal entry and steps forward. No-op with nothing to redo.
    pub fn redo(&self) -> Result<()> {
        let Some(scope) = self.journal.lock().peek_next().cloned() else {
            trace!(model = M::NAME, "nothing to redo");
            return Ok(());
        };
        scope.redo()?;
        self.journal.lock().go_forward()?;
        Ok(())
    }

    pub async fn undo_async(&self) -> Result<()> {
        let model = self.self_ref.upgrade().ok_or(ModelError::ModelDropped)?;
        self.dispatch(move || model.undo()).await
    }

    pub async fn redo_async(&self) -> Result<()> {
        let model = self.self_ref.upgrade().ok_or(ModelError::ModelDropped)?;
        self.dispatch(move || model.redo()).await
    }

    // ----- dispatcher -----

    pub fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        *self.dispatcher.write() = Some(dispatcher);
    }

    pub fn clear_dispatcher(&self) {
        *self.dispatcher.write() = None;
    }

    /// Runs `f` through the installed dispatcher, or inline without one.
    pub(crate) fn dispatch<F, R>(&self, f: F) -> impl Future<Output = Result<R>> + Send + 'static
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let dispatcher = self.dispatcher.read().clone();
        async move {
            let Some(dispatcher) = dispatcher else {
                return f();
            };
            let (tx, rx) = oneshot::channel();
            dispatcher
                .invoke(Box::new(move || {
                    let _ = tx.send(f());
                }))
                .await?;
            rx.await
                .map_err(|_| ModelError::Dispatcher("dispatched action never ran".to_string()))?
        }
    }

    /// Drops commands, command handlers, stored values and history.
    pub fn dispose(&self) {
        self.commands.write().clear();
        self.command_handlers.write().clear();
        self.slots.write().clear();
        self.journal.lock().clear();
        debug!(model = M::NAME, id = %self.id, "model disposed");
    }
}
