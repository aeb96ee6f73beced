//! Round-robin dispatch with failover.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::registry::SharedRoutingTable;
use crate::error::DispatchError;
use crate::health::scheduler::RecoveryScheduler;
use crate::transport::{HealthProbe, Upstream};

/// Routes each request to the node under the cursor, failing over in order.
pub struct Dispatcher<U, P> {
    registry: SharedRoutingTable,
    scheduler: RecoveryScheduler<P>,
    upstream: Arc<U>,
}

impl<U: Upstream, P: HealthProbe> Dispatcher<U, P> {
    /// Create a dispatcher over a registry and its recovery scheduler.
    pub fn new(registry: SharedRoutingTable, scheduler: RecoveryScheduler<P>, upstream: Arc<U>) -> Self {
        Self {
            registry,
            scheduler,
            upstream,
        }
    }

    /// Forward `request` to the next available node.
    ///
    /// Every node is tried at most once per request. The cursor moves exactly
    /// once per decision, after the outcome of that decision is known.
    pub async fn dispatch(&self, request: &U::Request) -> Result<U::Response, DispatchError> {
        let attempts = self.registry.len();
        if attempts == 0 {
            return Err(DispatchError::EmptyPool);
        }

        self.scheduler.sweep_stale();

        for _ in 0..attempts {
            let (position, mut node) = self.registry.current().ok_or(DispatchError::EmptyPool)?;

            if !node.online {
                debug!("Trying to force retrieve node {}", node.name);
                if !self.scheduler.recover(&node.name).await {
                    if !self.registry.any_online() {
                        return Err(DispatchError::EmptyPool);
                    }
                    self.registry.advance();
                    continue;
                }
                node = match self.registry.get(&node.name) {
                    Some(node) => node,
                    None => {
                        self.registry.advance();
                        continue;
                    }
                };
            }

            let outcome = self.upstream.forward(&node, request).await;
            self.registry.advance();

            match outcome {
                Ok(response) => {
                    debug!("Request served by node {} (position {})", node.name, position);
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Node {} failed: {}", node.name, e);
                    self.scheduler.mark_offline(&node.name);
                }
            }
        }

        Err(DispatchError::EmptyPool)
    }
}
