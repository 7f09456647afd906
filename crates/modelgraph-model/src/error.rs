use modelgraph_core::ModelGraphError;
use thiserror::Error;
use uuid::Uuid;

use crate::descriptor::PropertyKind;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Property {model}.{property} holds {found}, not {expected}")]
    TypeMismatch {
        model: &'static str,
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Property {model}.{property} is registered as a {actual} property")]
    KindMismatch {
        model: &'static str,
        property: String,
        actual: PropertyKind,
    },

    #[error("Structural usage error: {0}")]
    StructuralUsage(String),

    #[error("Scope {0} has already been started")]
    ScopeAlreadyStarted(Uuid),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("Model instance has been dropped")]
    ModelDropped,

    #[error(transparent)]
    Core(#[from] ModelGraphError),

    #[error("Action failed: {0}")]
    Action(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
