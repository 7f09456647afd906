use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use modelgraph_core::{ModelGraphError, PropagationManager};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::descriptor::{
    CollectionDescriptor, CollectionItem, ErasedDescriptor, PropertyDescriptor, PropertyKind,
    PropertyValue,
};
use crate::error::{ModelError, Result};

/// A model type: a marker naming the type and describing its properties once.
pub trait ModelType: Sized + Send + Sync + 'static {
    const NAME: &'static str;

    /// Registers properties, rules and dependencies. Runs once per registry.
    fn describe(builder: &mut TypeBuilder<Self>) -> Result<()> {
        let _ = builder;
        Ok(())
    }
}

struct PendingEntry {
    kind: PropertyKind,
    value_type: &'static str,
    descriptor: Box<dyn ErasedDescriptor>,
}

/// Collects descriptors while `ModelType::describe` runs.
pub struct TypeBuilder<M> {
    entries: HashMap<String, PendingEntry>,
    edges: Vec<(String, String)>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: ModelType> TypeBuilder<M> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            edges: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Descriptor for scalar property `name`, created on first use.
    pub fn property<T: PropertyValue>(&mut self, name: &str) -> Result<&mut PropertyDescriptor<M, T>> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| PendingEntry {
                kind: PropertyKind::Scalar,
                value_type: type_name::<T>(),
                descriptor: Box::new(PropertyDescriptor::<M, T>::new(name)),
            });
        check_kind::<M>(name, entry.kind, PropertyKind::Scalar)?;
        let found = entry.value_type;
        entry
            .descriptor
            .as_any_mut()
            .downcast_mut::<PropertyDescriptor<M, T>>()
            .ok_or_else(|| type_mismatch::<M, T>(name, found))
    }

    /// Descriptor for collection property `name`, created on first use.
    pub fn collection<T: CollectionItem>(&mut self, name: &str) -> Result<&mut CollectionDescriptor<M, T>> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| PendingEntry {
                kind: PropertyKind::Collection,
                value_type: type_name::<T>(),
                descriptor: Box::new(CollectionDescriptor::<M, T>::new(name)),
            });
        check_kind::<M>(name, entry.kind, PropertyKind::Collection)?;
        let found = entry.value_type;
        entry
            .descriptor
            .as_any_mut()
            .downcast_mut::<CollectionDescriptor<M, T>>()
            .ok_or_else(|| type_mismatch::<M, T>(name, found))
    }

    /// Declares that `dependent` is re-notified when any of `sources` changes,
    /// without giving `dependent` a descriptor (computed properties).
    pub fn depend_on(&mut self, dependent: &str, sources: &[&str]) -> &mut Self {
        for source in sources {
            self.edges.push((source.to_string(), dependent.to_string()));
        }
        self
    }

    fn finish(self) -> TypeMetadata<M> {
        let propagation = PropagationManager::new();
        let mut entries = HashMap::with_capacity(self.entries.len());

        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        for name in names {
            for source in self.entries[name].descriptor.dependencies() {
                propagation.graph().add_edge(source, name);
            }
        }
        for (source, dependent) in &self.edges {
            propagation.graph().add_edge(source, dependent);
        }

        for (name, pending) in self.entries {
            entries.insert(
                name,
                MetadataEntry {
                    kind: pending.kind,
                    value_type: pending.value_type,
                    descriptor: pending.descriptor.into_shared(),
                },
            );
        }

        debug!(
            model = M::NAME,
            properties = entries.len(),
            edges = propagation.graph().edge_count(),
            "described model type"
        );

        TypeMetadata {
            entries: RwLock::new(entries),
            propagation,
            _marker: PhantomData,
        }
    }
}

fn check_kind<M: ModelType>(name: &str, actual: PropertyKind, requested: PropertyKind) -> Result<()> {
    if actual == requested {
        Ok(())
    } else {
        Err(ModelError::KindMismatch {
            model: M::NAME,
            property: name.to_string(),
            actual,
        })
    }
}

fn type_mismatch<M: ModelType, T>(name: &str, found: &'static str) -> ModelError {
    ModelError::TypeMismatch {
        model: M::NAME,
        property: name.to_string(),
        expected: type_name::<T>(),
        found,
    }
}

struct MetadataEntry {
    kind: PropertyKind,
    value_type: &'static str,
    descriptor: Arc<dyn Any + Send + Sync>,
}

/// Descriptors and dependency graph of one model type, shared by its instances.
pub struct TypeMetadata<M> {
    entries: RwLock<HashMap<String, MetadataEntry>>,
    propagation: PropagationManager,
    _marker: PhantomData<fn() -> M>,
}

impl<M: ModelType> TypeMetadata<M> {
    /// Scalar descriptor for `name`. Undescribed names get a plain descriptor once.
    pub fn descriptor<T: PropertyValue>(&self, name: &str) -> Result<Arc<PropertyDescriptor<M, T>>> {
        self.lookup(name, PropertyKind::Scalar, type_name::<T>(), || {
            Arc::new(PropertyDescriptor::<M, T>::new(name))
        })
    }

    pub fn collection_descriptor<T: CollectionItem>(
        &self,
        name: &str,
    ) -> Result<Arc<CollectionDescriptor<M, T>>> {
        self.lookup(name, PropertyKind::Collection, type_name::<T>(), || {
            Arc::new(CollectionDescriptor::<M, T>::new(name))
        })
    }

    fn lookup<D, F>(
        &self,
        name: &str,
        kind: PropertyKind,
        value_type: &'static str,
        create: F,
    ) -> Result<Arc<D>>
    where
        D: Any + Send + Sync,
        F: FnOnce() -> Arc<D>,
    {
        if let Some(entry) = self.entries.read().get(name) {
            return Self::downcast(name, kind, value_type, entry);
        }

        let mut entries = self.entries.write();
        let entry = entries.entry(name.to_string()).or_insert_with(|| {
            debug!(model = M::NAME, property = name, "registering plain descriptor");
            MetadataEntry {
                kind,
                value_type,
                descriptor: create(),
            }
        });
        Self::downcast(name, kind, value_type, entry)
    }

    fn downcast<D: Any + Send + Sync>(
        name: &str,
        kind: PropertyKind,
        expected: &'static str,
        entry: &MetadataEntry,
    ) -> Result<Arc<D>> {
        check_kind::<M>(name, entry.kind, kind)?;
        Arc::clone(&entry.descriptor)
            .downcast::<D>()
            .map_err(|_| ModelError::TypeMismatch {
                model: M::NAME,
                property: name.to_string(),
                expected,
                found: entry.value_type,
            })
    }

    pub fn propagation(&self) -> &PropagationManager {
        &self.propagation
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<PropertyKind> {
        self.entries.read().get(name).map(|e| e.kind)
    }

    /// Registered property names, sorted.
    pub fn property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Process-wide metadata registry keyed by model type.
///
/// Each type is described exactly once per registry, even when many threads
/// ask for it at the same time.
#[derive(Default)]
pub struct DescriptorRegistry {
    types: DashMap<TypeId, Arc<OnceCell<Arc<dyn Any + Send + Sync>>>>,
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("types", &self.types.len())
            .finish()
    }
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata<M: ModelType>(&self) -> Result<Arc<TypeMetadata<M>>> {
        // Clone the cell out so the shard lock is released before `describe` runs.
        let cell = self
            .types
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let shared = cell.get_or_try_init(|| -> Result<Arc<dyn Any + Send + Sync>> {
            info!(model = M::NAME, "building model metadata");
            let mut builder = TypeBuilder::<M>::new();
            M::describe(&mut builder)?;
            Ok(Arc::new(builder.finish()))
        })?;

        Arc::clone(shared).downcast::<TypeMetadata<M>>().map_err(|_| {
            ModelError::Core(ModelGraphError::InvalidOperation(format!(
                "metadata registered for {} has an unexpected type",
                M::NAME
            )))
        })
    }

    pub fn is_described<M: ModelType>(&self) -> bool {
        self.types
            .get(&TypeId::of::<M>())
            .map(|cell| cell.value().get().is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
