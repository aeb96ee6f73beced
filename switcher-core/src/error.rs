//! Error types shared across the balancer core.

use std::time::Duration;
use thiserror::Error;

/// Rejections from the node registry. No state is changed when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A node with this name is already registered
    #[error("{0} already exists")]
    DuplicateName(String),

    /// No node with this name is registered
    #[error("node {0} not found")]
    NotFound(String),
}

/// Failure to talk to an upstream node, while forwarding or probing.
///
/// These never escape the dispatch engine: they are turned into node state
/// transitions instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The node address cannot be used to open a connection
    #[error("invalid node address {0}")]
    InvalidTarget(String),

    /// Connecting or exchanging the request failed
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The exchange did not complete in time
    #[error("request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The node answered with something that is not valid HTTP
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The only failure that crosses the dispatch boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// No node could take the request
    #[error("All nodes are offline")]
    EmptyPool,
}
