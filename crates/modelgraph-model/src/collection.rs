//! Collection properties: structural edits, whole-collection validation and
//! diff records for undo.

use std::sync::Arc;

use modelgraph_core::{CollectionChange, ObservableList, ValidationResultCollection};
use tracing::{debug, trace};

use crate::descriptor::{CollectionDescriptor, CollectionItem};
use crate::error::Result;
use crate::model::Model;
use crate::property::Slot;
use crate::record::{ChangeRecord, CollectionChangeRecord};
use crate::registry::ModelType;

/// Borrowed view of one collection property of a model instance.
///
/// Every mutation runs the collection pipeline: validate the whole
/// collection, run on-changed callbacks, then record or notify.
pub struct CollectionHandle<'a, M, T> {
    model: &'a Model<M>,
    descriptor: Arc<CollectionDescriptor<M, T>>,
    slot: Arc<Slot>,
}

impl<'a, M: ModelType, T: CollectionItem> CollectionHandle<'a, M, T> {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn items(&self) -> Vec<T> {
        self.read(|list| list.items().to_vec())
    }

    pub fn len(&self) -> usize {
        self.read(|list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.read(|list| list.get(index).cloned())
    }

    pub fn contains(&self, item: &T) -> bool {
        self.read(|list| list.contains(item))
    }

    pub fn push(&self, item: T) -> Result<()> {
        self.edit(|list| Ok(Some(list.push(item))))
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.edit(|list| Ok(Some(list.insert(index, item)?)))
    }

    pub fn extend(&self, items: Vec<T>) -> Result<()> {
        self.edit(|list| Ok(list.extend(items)))
    }

    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.edit(|list| Ok(Some(list.remove_at(index)?)))
    }

    /// Removes the first occurrence of `item`. Returns whether it was present.
    pub fn remove(&self, item: &T) -> Result<bool> {
        let mut found = false;
        self.edit(|list| {
            let change = list.remove(item);
            found = change.is_some();
            Ok(change)
        })?;
        Ok(found)
    }

    pub fn replace(&self, index: usize, item: T) -> Result<()> {
        self.edit(|list| Ok(Some(list.replace(index, item)?)))
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.edit(|list| Ok(Some(list.move_item(from, to)?)))
    }

    pub fn clear(&self) -> Result<()> {
        self.edit(|list| {
            if list.is_empty() {
                Ok(None)
            } else {
                Ok(Some(list.clear()))
            }
        })
    }

    fn read<R: Default>(&self, f: impl FnOnce(&ObservableList<T>) -> R) -> R {
        self.slot
            .with_state::<ObservableList<T>, _>(|list| f(list))
            .unwrap_or_default()
    }

    fn edit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ObservableList<T>) -> modelgraph_core::Result<Option<CollectionChange<T>>>,
    {
        let change = self
            .slot
            .typed::<M, ObservableList<T>, _>(self.name(), f)??;
        if let Some(change) = change {
            self.model
                .collection_pass(&self.descriptor, &self.slot, change, false);
        }
        Ok(())
    }
}

impl<M: ModelType> Model<M> {
    /// Handle to collection property `name`, created empty on first use.
    pub fn collection<T: CollectionItem>(&self, name: &str) -> Result<CollectionHandle<'_, M, T>> {
        let descriptor = self.metadata().collection_descriptor::<T>(name)?;
        let slot = self.slot_for(name, Slot::collection::<T>);
        slot.typed::<M, ObservableList<T>, _>(name, |_| ())?;
        Ok(CollectionHandle {
            model: self,
            descriptor,
            slot,
        })
    }

    pub fn collection_items<T: CollectionItem>(&self, name: &str) -> Result<Vec<T>> {
        Ok(self.collection::<T>(name)?.items())
    }

    /// Runs validation, on-changed callbacks and record-or-notify after `change`
    /// was applied. Replays skip the rejecting rules and always notify.
    pub(crate) fn collection_pass<T: CollectionItem>(
        &self,
        descriptor: &CollectionDescriptor<M, T>,
        slot: &Slot,
        change: CollectionChange<T>,
        replay: bool,
    ) {
        let name = descriptor.name();
        let had_errors = slot.has_errors();
        slot.replace_results(ValidationResultCollection::new());
        let items: Vec<T> = slot
            .with_state::<ObservableList<T>, _>(|list| list.items().to_vec())
            .unwrap_or_default();

        let mut results = ValidationResultCollection::new();
        let mut succeeded = true;
        let mut notify_anyway = false;
        for record in &descriptor.validations {
            if record.run(self, name, items.as_slice(), &mut results) {
                succeeded = false;
                notify_anyway |= record.options.notify_on_error;
                if !record.options.continue_on_error && !replay {
                    debug!(property = name, "collection change kept but rejected");
                    self.finish_pass(name, slot, results, had_errors);
                    return;
                }
            }
        }
        self.finish_pass(name, slot, results, had_errors);

        for action in &descriptor.on_changed {
            action(self, items.as_slice());
        }

        if replay {
            trace!(property = name, action = ?change.action, "replayed collection change");
            self.notify(&[name]);
        } else if succeeded || notify_anyway {
            self.record_or_notify(name, descriptor.recording_enabled(), move || {
                let record: Arc<dyn ChangeRecord<M>> =
                    Arc::new(CollectionChangeRecord::new(name, change));
                record
            });
        }
    }

    /// Applies a recorded diff during undo or redo.
    ///
    /// Unrecorded edits made since the diff was captured do not make replay
    /// fail: items are matched by value when their recorded position moved.
    pub(crate) fn replay_collection<T: CollectionItem>(
        &self,
        name: &str,
        change: &CollectionChange<T>,
    ) -> Result<()> {
        let descriptor = self.metadata().collection_descriptor::<T>(name)?;
        let slot = self.slot_for(name, Slot::collection::<T>);
        slot.typed::<M, ObservableList<T>, _>(name, |list| list.replay(change))?;
        self.collection_pass(&descriptor, &slot, change.clone(), true);
        Ok(())
    }
}
