//! Change propagation across dependent properties.
//!
//! - DependencyGraph: declared "dependent depends on source" edges
//! - PropagationManager: breadth-first notification order over that graph,
//!   each property emitted at most once per pass, cycles included

mod manager;

pub use manager::*;
