//! Switcher Core functionality.
//!
//! This crate contains the node registry, the offline tracking and recovery
//! machinery, and the round-robin dispatch engine that power the Switcher
//! load balancer. It knows nothing about HTTP: the network is reached through
//! the [`transport::Upstream`] and [`transport::HealthProbe`] traits.

pub mod balancer;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod health;
pub mod transport;

pub use balancer::{Balancer, HealthReport};
pub use domain::node::{NodePatch, NodeRecord, ProbeAnswer, ProbeOutcome, ProbeReport};
pub use domain::registry::RoutingTable;
pub use error::{DispatchError, RegistryError, TransportError};
pub use health::tracker::RecoverySettings;
pub use transport::{HealthProbe, Upstream};
