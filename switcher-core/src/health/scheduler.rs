//! Recovery of offline nodes.
//!
//! Timer ticks and request-driven forced probes both end up in
//! [`RecoveryScheduler::recover`], so the success criteria are identical no
//! matter what triggered the probe.

use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::node::{NodeRecord, ProbeOutcome, ProbeReport};
use crate::domain::registry::SharedRoutingTable;
use crate::health::tracker::{HealthTracker, RecoveryWindow, TimerHandle};
use crate::transport::HealthProbe;

/// Drives the online/offline transitions of nodes.
///
/// Cheap to clone; every clone shares the same registry, tracker and probe.
#[derive(Debug)]
pub struct RecoveryScheduler<P> {
    registry: SharedRoutingTable,
    tracker: Arc<HealthTracker>,
    probe: Arc<P>,
}

impl<P> Clone for RecoveryScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            probe: self.probe.clone(),
        }
    }
}

impl<P: HealthProbe> RecoveryScheduler<P> {
    /// Create a scheduler over a registry and a tracker.
    pub fn new(registry: SharedRoutingTable, tracker: Arc<HealthTracker>, probe: Arc<P>) -> Self {
        Self {
            registry,
            tracker,
            probe,
        }
    }

    /// The tracker holding the offline entries.
    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    /// Take a node out of rotation and start retrying it.
    ///
    /// Does not restart the window of a node that is already being retried.
    pub fn mark_offline(&self, name: &str) {
        if !self.registry.set_online(name, false) {
            return;
        }

        let started = self
            .tracker
            .track(name, |window| self.spawn_timer(name.to_string(), window));
        if started {
            info!("Node {} offline, scheduling recovery", name);
        }
    }

    /// Put a tracked node back in rotation and cancel its timer.
    ///
    /// Returns false, without touching the node, when it was not tracked.
    pub fn mark_online(&self, name: &str) -> bool {
        if !self.tracker.release(name) {
            return false;
        }
        self.registry.set_online(name, true);
        info!("Node {} online", name);
        true
    }

    /// Stop retrying a node, e.g. because it was removed from the registry.
    pub fn forget(&self, name: &str) -> bool {
        self.tracker.release(name)
    }

    /// Probe a tracked node once and promote it on success.
    ///
    /// Returns whether the node is online afterwards. Untracked nodes are not
    /// probed.
    pub async fn recover(&self, name: &str) -> bool {
        if !self.tracker.is_tracked(name) {
            return self.registry.get(name).is_some_and(|node| node.online);
        }

        let Some(node) = self.registry.get(name) else {
            self.tracker.release(name);
            return false;
        };

        let report = self.probe_node(&node).await;
        let reachable = report.is_reachable();
        if let ProbeOutcome::Unreachable { error } = &report.outcome {
            debug!("Recovery probe of node {} failed: {}", name, error);
        }
        self.registry.record_probe(name, report);

        if reachable {
            self.mark_online(name);
        }
        self.registry.get(name).is_some_and(|node| node.online)
    }

    /// Open a new window for every tracked node whose timer ran out.
    pub fn sweep_stale(&self) {
        let refreshed = self.tracker.refresh_stale(Instant::now(), |name, window| {
            self.spawn_timer(name.to_string(), window)
        });
        for name in refreshed {
            info!("Rescheduling {} recovery", name);
        }
    }

    /// Probe every registered node concurrently and record the results.
    ///
    /// Tracked nodes that answer are put back online. Returns the reports in
    /// registry order.
    pub async fn check_all(&self) -> Vec<(NodeRecord, ProbeReport)> {
        let nodes = self.registry.list();
        let probes = nodes.iter().map(|node| async move {
            let report = self.probe_node(node).await;
            (node.clone(), report)
        });
        let results = futures::future::join_all(probes).await;

        for (node, report) in &results {
            self.registry.record_probe(&node.name, report.clone());
            if report.is_reachable() {
                self.mark_online(&node.name);
            }
        }
        results
    }

    async fn probe_node(&self, node: &NodeRecord) -> ProbeReport {
        let at = SystemTime::now();
        let started = Instant::now();
        let outcome = match self.probe.probe(node).await {
            Ok(answer) => ProbeOutcome::Reachable {
                status: answer.status,
                body: answer.body,
            },
            Err(e) => ProbeOutcome::Unreachable {
                error: e.to_string(),
            },
        };
        ProbeReport {
            at,
            round_trip: started.elapsed(),
            outcome,
        }
    }

    fn spawn_timer(&self, name: String, window: RecoveryWindow) -> TimerHandle {
        let scheduler = self.clone();
        let every = self.tracker.settings().interval;

        TimerHandle::new(tokio::spawn(async move {
            let mut ticks = time::interval_at(window.start + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let fired = ticks.tick().await;
                if fired > window.end {
                    break;
                }

                debug!("Trying to retrieve node {}", name);
                if scheduler.recover(&name).await {
                    break;
                }
            }
        }))
    }
}
