//! Domain models: backend nodes and the registry holding them.

pub mod node;
pub mod registry;
