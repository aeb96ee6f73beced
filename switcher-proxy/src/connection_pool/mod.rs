//! Idle connection reuse towards nodes.

pub mod pool;
