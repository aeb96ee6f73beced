//! Seams between the balancer core and the network.

use std::future::Future;

use crate::domain::node::{NodeRecord, ProbeAnswer};
use crate::error::TransportError;

/// Liveness check of one node.
pub trait HealthProbe: Send + Sync + 'static {
    /// Request `node.health_check_url()` and return what the node answered.
    ///
    /// Any answer counts as success; only transport failures are errors.
    fn probe(&self, node: &NodeRecord) -> impl Future<Output = Result<ProbeAnswer, TransportError>> + Send;
}

/// Forwarding of one inbound request to one node.
pub trait Upstream: Send + Sync + 'static {
    /// Inbound request as buffered by the front end
    type Request: Send + Sync;
    /// Upstream response relayed back to the caller
    type Response: Send;

    /// Send `request` to `node` and return its response verbatim.
    fn forward(
        &self,
        node: &NodeRecord,
        request: &Self::Request,
    ) -> impl Future<Output = Result<Self::Response, TransportError>> + Send;
}
