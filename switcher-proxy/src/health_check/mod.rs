//! Liveness probes of nodes.

pub mod prober;
