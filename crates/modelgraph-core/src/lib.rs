pub mod collection;
pub mod config_manager;
pub mod error;
pub mod journal;
pub mod logging;
pub mod observer;
pub mod propagation;
pub mod validation;

pub use collection::*;
pub use config_manager::*;
pub use error::*;
pub use journal::*;
pub use logging::*;
pub use observer::*;
pub use propagation::*;
pub use validation::*;
