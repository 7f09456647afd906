use std::fmt;

use modelgraph_core::CollectionChange;

use crate::descriptor::{CollectionItem, PropertyValue};
use crate::error::Result;
use crate::model::Model;
use crate::registry::ModelType;

/// A reversible mutation captured inside a scope.
pub trait ChangeRecord<M>: Send + Sync + fmt::Debug {
    fn property(&self) -> &str;

    fn undo(&self, model: &Model<M>) -> Result<()>;

    fn redo(&self, model: &Model<M>) -> Result<()>;
}

/// Scalar assignment from `old_value` to `new_value`.
#[derive(Debug, Clone)]
pub struct PropertyChangeRecord<T> {
    property: String,
    pub old_value: T,
    pub new_value: T,
}

impl<T> PropertyChangeRecord<T> {
    pub fn new(property: impl Into<String>, old_value: T, new_value: T) -> Self {
        Self {
            property: property.into(),
            old_value,
            new_value,
        }
    }
}

impl<M: ModelType, T: PropertyValue> ChangeRecord<M> for PropertyChangeRecord<T> {
    fn property(&self) -> &str {
        &self.property
    }

    fn undo(&self, model: &Model<M>) -> Result<()> {
        model.replay_value(&self.property, self.old_value.clone())
    }

    fn redo(&self, model: &Model<M>) -> Result<()> {
        model.replay_value(&self.property, self.new_value.clone())
    }
}

/// Structural change of a collection property.
#[derive(Debug, Clone)]
pub struct CollectionChangeRecord<T> {
    property: String,
    pub change: CollectionChange<T>,
}

impl<T> CollectionChangeRecord<T> {
    pub fn new(property: impl Into<String>, change: CollectionChange<T>) -> Self {
        Self {
            property: property.into(),
            change,
        }
    }
}

impl<M: ModelType, T: CollectionItem> ChangeRecord<M> for CollectionChangeRecord<T> {
    fn property(&self) -> &str {
        &self.property
    }

    fn undo(&self, model: &Model<M>) -> Result<()> {
        model.replay_collection(&self.property, &self.change.inverse())
    }

    fn redo(&self, model: &Model<M>) -> Result<()> {
        model.replay_collection(&self.property, &self.change)
    }
}
