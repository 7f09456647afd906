//! Reactive models: typed properties with validation and coercion, change
//! notification along declared dependencies, and undoable edit scopes.

pub mod collection;
pub mod command;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod model;
mod property;
pub mod record;
pub mod registry;
pub mod scope;

pub use collection::*;
pub use command::*;
pub use descriptor::*;
pub use dispatcher::*;
pub use error::*;
pub use model::*;
pub use record::*;
pub use registry::*;
pub use scope::*;

pub use modelgraph_core::{
    ModelGraphConfig, Subscription, ValidationKind, ValidationResult, ValidationResultCollection,
    Validator,
};
