//! The balancer facade used by the front end and the admin surface.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::dispatch::engine::Dispatcher;
use crate::domain::node::{NodePatch, NodeRecord, ProbeReport};
use crate::domain::registry::{RoutingTable, SharedRoutingTable};
use crate::error::{DispatchError, RegistryError};
use crate::health::scheduler::RecoveryScheduler;
use crate::health::tracker::{HealthTracker, OfflineSnapshot, RecoverySettings};
use crate::transport::{HealthProbe, Upstream};

/// Read-only picture of the pool, for the health endpoint.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Position of the round-robin cursor
    pub cursor: usize,
    /// Every registered node, in dispatch order
    pub nodes: Vec<NodeRecord>,
    /// Every node currently being retried
    pub offline: Vec<OfflineSnapshot>,
}

/// Owns the node pool and keeps registry and recovery tracking consistent.
pub struct Balancer<U, P> {
    registry: SharedRoutingTable,
    scheduler: RecoveryScheduler<P>,
    dispatcher: Dispatcher<U, P>,
}

impl<U: Upstream, P: HealthProbe> Balancer<U, P> {
    /// Build a balancer over an initial, already validated routing table.
    pub fn new(registry: RoutingTable, settings: RecoverySettings, upstream: Arc<U>, probe: Arc<P>) -> Self {
        let registry = Arc::new(registry);
        let tracker = Arc::new(HealthTracker::new(settings));
        let scheduler = RecoveryScheduler::new(registry.clone(), tracker, probe);
        let dispatcher = Dispatcher::new(registry.clone(), scheduler.clone(), upstream);
        Self {
            registry,
            scheduler,
            dispatcher,
        }
    }

    /// Forward a request to the next available node.
    pub async fn dispatch(&self, request: &U::Request) -> Result<U::Response, DispatchError> {
        self.dispatcher.dispatch(request).await
    }

    /// Register a new node at the end of the rotation.
    pub fn add_node(&self, node: NodeRecord) -> Result<NodeRecord, RegistryError> {
        self.registry.add(node.clone())?;
        info!("Adding node {} at {}", node.name, node.uri);
        Ok(node)
    }

    /// Remove a node, cancelling its recovery if one is running.
    pub fn remove_node(&self, name: &str) -> Result<NodeRecord, RegistryError> {
        let removed = self.registry.remove(name)?;
        self.scheduler.forget(name);
        info!("Removed node {}", name);
        Ok(removed)
    }

    /// Partially update a node.
    ///
    /// A running recovery follows a rename. Setting `online` to true ends the
    /// recovery; setting it to false is a manual disable and is not retried.
    pub fn update_node(&self, name: &str, patch: &NodePatch) -> Result<NodeRecord, RegistryError> {
        let updated = self.registry.update(name, patch)?;

        if updated.online || patch.online == Some(false) {
            self.scheduler.forget(name);
            self.scheduler.forget(&updated.name);
        } else if updated.name != name && self.scheduler.forget(name) {
            self.scheduler.mark_offline(&updated.name);
        }
        Ok(updated)
    }

    /// Look up one node.
    pub fn node(&self, name: &str) -> Option<NodeRecord> {
        self.registry.get(name)
    }

    /// All nodes in dispatch order.
    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.registry.list().iter().cloned().collect()
    }

    /// Current state of every node and every recovery in flight.
    pub fn describe(&self) -> HealthReport {
        HealthReport {
            cursor: self.registry.cursor(),
            nodes: self.nodes(),
            offline: self.scheduler.tracker().snapshot(),
        }
    }

    /// Probe every node now and return the reports in dispatch order.
    pub async fn check_health(&self) -> Vec<(NodeRecord, ProbeReport)> {
        self.scheduler.check_all().await
    }

    /// Recovery timing in use.
    pub fn recovery_settings(&self) -> RecoverySettings {
        self.scheduler.tracker().settings()
    }

    /// Time left in the recovery window of `name`, if it is being retried.
    pub fn recovery_remaining(&self, name: &str) -> Option<Duration> {
        let now = tokio::time::Instant::now();
        self.scheduler
            .tracker()
            .snapshot()
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.window.end.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::ProbeAnswer;
    use crate::error::TransportError;

    struct Unreachable;

    impl Upstream for Unreachable {
        type Request = ();
        type Response = ();

        async fn forward(&self, _node: &NodeRecord, _request: &()) -> Result<(), TransportError> {
            Err(TransportError::Unreachable("down".into()))
        }
    }

    impl HealthProbe for Unreachable {
        async fn probe(&self, _node: &NodeRecord) -> Result<ProbeAnswer, TransportError> {
            Err(TransportError::Unreachable("down".into()))
        }
    }

    fn balancer() -> Balancer<Unreachable, Unreachable> {
        let table = RoutingTable::from_nodes(vec![
            NodeRecord::new("a", "http://a", "/check"),
            NodeRecord::new("b", "http://b", "/check"),
        ])
        .unwrap();
        let net = Arc::new(Unreachable);
        Balancer::new(table, RecoverySettings::default(), net.clone(), net)
    }

    #[tokio::test]
    async fn removing_a_node_cancels_its_recovery() {
        let balancer = balancer();
        assert!(balancer.dispatch(&()).await.is_err());
        assert_eq!(balancer.describe().offline.len(), 2);

        let removed = balancer.remove_node("a").unwrap();
        assert_eq!(removed.name, "a");
        let report = balancer.describe();
        assert_eq!(report.offline.len(), 1);
        assert_eq!(report.offline[0].name, "b");
        assert_eq!(report.nodes.len(), 1);
    }

    #[tokio::test]
    async fn rename_moves_the_recovery() {
        let balancer = balancer();
        balancer.dispatch(&()).await.unwrap_err();

        let patch = NodePatch {
            name: Some("a2".into()),
            ..NodePatch::default()
        };
        let updated = balancer.update_node("a", &patch).unwrap();
        assert_eq!(updated.name, "a2");
        assert!(balancer.recovery_remaining("a").is_none());
        assert!(balancer.recovery_remaining("a2").is_some());
    }

    #[tokio::test]
    async fn enabling_a_node_ends_its_recovery() {
        let balancer = balancer();
        balancer.dispatch(&()).await.unwrap_err();

        let patch = NodePatch {
            online: Some(true),
            ..NodePatch::default()
        };
        assert!(balancer.update_node("b", &patch).unwrap().online);
        let offline: Vec<_> = balancer.describe().offline.into_iter().map(|e| e.name).collect();
        assert_eq!(offline, vec!["a"]);
    }

    #[tokio::test]
    async fn manual_disable_is_not_retried() {
        let balancer = balancer();
        let patch = NodePatch {
            online: Some(false),
            ..NodePatch::default()
        };
        assert!(!balancer.update_node("a", &patch).unwrap().online);
        assert!(balancer.describe().offline.is_empty());
    }

    /// Forwards fail, probes succeed.
    struct Flaky;

    impl Upstream for Flaky {
        type Request = ();
        type Response = ();

        async fn forward(&self, _node: &NodeRecord, _request: &()) -> Result<(), TransportError> {
            Err(TransportError::Unreachable("reset".into()))
        }
    }

    impl HealthProbe for Flaky {
        async fn probe(&self, _node: &NodeRecord) -> Result<ProbeAnswer, TransportError> {
            Ok(200.into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn manual_disable_stops_a_running_recovery() {
        let table = RoutingTable::from_nodes(vec![NodeRecord::new("a", "http://a", "/check")]).unwrap();
        let settings = RecoverySettings {
            interval: Duration::from_secs(1),
            window: Duration::from_secs(10),
        };
        let net = Arc::new(Flaky);
        let balancer = Balancer::new(table, settings, net.clone(), net);

        balancer.dispatch(&()).await.unwrap_err();
        assert_eq!(balancer.describe().offline.len(), 1);

        let patch = NodePatch {
            online: Some(false),
            ..NodePatch::default()
        };
        balancer.update_node("a", &patch).unwrap();
        assert!(balancer.describe().offline.is_empty());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!balancer.node("a").unwrap().online);
    }

    #[tokio::test]
    async fn manual_disable_with_rename_is_not_retried() {
        let balancer = balancer();
        balancer.dispatch(&()).await.unwrap_err();

        let patch = NodePatch {
            name: Some("a2".into()),
            online: Some(false),
            ..NodePatch::default()
        };
        balancer.update_node("a", &patch).unwrap();
        assert!(balancer.recovery_remaining("a").is_none());
        assert!(balancer.recovery_remaining("a2").is_none());
    }

    #[tokio::test]
    async fn admin_errors_are_distinct() {
        let balancer = balancer();
        assert_eq!(
            balancer.add_node(NodeRecord::new("a", "http://x", "/")),
            Err(RegistryError::DuplicateName("a".into()))
        );
        assert_eq!(balancer.remove_node("zz"), Err(RegistryError::NotFound("zz".into())));
        assert_eq!(
            balancer.update_node("zz", &NodePatch::default()),
            Err(RegistryError::NotFound("zz".into()))
        );
    }
}
