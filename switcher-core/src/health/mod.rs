//! Offline tracking and recovery of backend nodes.

pub mod scheduler;
pub mod tracker;
