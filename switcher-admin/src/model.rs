//! JSON bodies of the admin routes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use switcher_core::health::tracker::OfflineSnapshot;
use switcher_core::{HealthReport, NodePatch, NodeRecord, ProbeOutcome, ProbeReport};

/// Body of `POST /switcher-balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNode {
    /// Unique node name
    pub name: String,
    /// Base address of the node
    pub uri: String,
    /// Probe path; the configured default when omitted
    #[serde(default)]
    pub check_endpoint: Option<String>,
    /// Initial online flag; online when omitted
    #[serde(default)]
    pub status: Option<bool>,
}

impl NewNode {
    /// Turn the body into a registry record.
    pub fn into_record(self, default_check_path: &str) -> NodeRecord {
        let check = self
            .check_endpoint
            .unwrap_or_else(|| default_check_path.to_string());
        NodeRecord::new(self.name, self.uri, check).with_online(self.status.unwrap_or(true))
    }
}

/// Body of `PATCH /switcher-balance/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchBody {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New base address
    #[serde(default)]
    pub uri: Option<String>,
    /// New probe path
    #[serde(default)]
    pub check_endpoint: Option<String>,
    /// New online flag
    #[serde(default)]
    pub status: Option<bool>,
}

impl From<PatchBody> for NodePatch {
    fn from(body: PatchBody) -> Self {
        // Empty strings leave the field unchanged.
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        NodePatch {
            name: non_empty(body.name),
            uri: non_empty(body.uri),
            health_check_path: non_empty(body.check_endpoint),
            online: body.status,
        }
    }
}

/// A node as shown to admin clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    /// Node name
    pub name: String,
    /// Base address
    pub uri: String,
    /// Probe path
    pub check_endpoint: String,
    /// Online flag
    pub status: bool,
}

impl From<&NodeRecord> for NodeView {
    fn from(node: &NodeRecord) -> Self {
        Self {
            name: node.name.clone(),
            uri: node.uri.clone(),
            check_endpoint: node.health_check_path.clone(),
            status: node.online,
        }
    }
}

/// One line of the `checkhealth` answer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckHealthEntry {
    /// Node name
    pub name: String,
    /// Base address
    pub uri: String,
    /// Online flag after the probe
    pub status: bool,
    /// Probe round trip in milliseconds
    pub time: u64,
    /// HTTP status of the probe, when the node answered
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Probe response body; parsed when it is JSON, verbatim otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Transport error, when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckHealthEntry {
    /// Combine a node with the probe just run against it.
    pub fn new(node: &NodeRecord, online: bool, report: &ProbeReport) -> Self {
        let (status_code, body, error) = match &report.outcome {
            ProbeOutcome::Reachable { status, body } => (Some(*status), probe_body(body), None),
            ProbeOutcome::Unreachable { error } => (None, None, Some(error.clone())),
        };
        Self {
            name: node.name.clone(),
            uri: node.uri.clone(),
            status: online,
            time: millis(report.round_trip),
            status_code,
            body,
            error,
        }
    }
}

/// Stored probe result, as shown in the describe answer.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeView {
    /// Unix time of the probe in milliseconds
    pub at: u64,
    /// Round trip in milliseconds
    pub time: u64,
    /// HTTP status, when the node answered
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Transport error, when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ProbeReport> for ProbeView {
    fn from(report: &ProbeReport) -> Self {
        let (status_code, error) = match &report.outcome {
            ProbeOutcome::Reachable { status, .. } => (Some(*status), None),
            ProbeOutcome::Unreachable { error } => (None, Some(error.clone())),
        };
        Self {
            at: unix_millis(report.at),
            time: millis(report.round_trip),
            status_code,
            error,
        }
    }
}

/// A node plus its last probe, as shown in the describe answer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatusView {
    /// The node itself
    #[serde(flatten)]
    pub node: NodeView,
    /// Last probe outcome
    pub last_probe: Option<ProbeView>,
}

/// A recovery in flight.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineView {
    /// Node name
    pub name: String,
    /// Unix time the window opened, in milliseconds
    pub started_at: u64,
    /// Window length in milliseconds
    pub window: u64,
    /// Whether probes are still scheduled in this window
    pub active: bool,
}

impl From<&OfflineSnapshot> for OfflineView {
    fn from(entry: &OfflineSnapshot) -> Self {
        Self {
            name: entry.name.clone(),
            started_at: unix_millis(entry.started_at),
            window: millis(entry.window.end.saturating_duration_since(entry.window.start)),
            active: entry.active,
        }
    }
}

/// Answer of `GET /switcher-balance`.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeView {
    /// Round-robin cursor
    pub cursor: usize,
    /// Nodes in dispatch order
    pub nodes: Vec<NodeStatusView>,
    /// Recoveries in flight
    pub offline: Vec<OfflineView>,
}

impl From<&HealthReport> for DescribeView {
    fn from(report: &HealthReport) -> Self {
        Self {
            cursor: report.cursor,
            nodes: report
                .nodes
                .iter()
                .map(|node| NodeStatusView {
                    node: NodeView::from(node),
                    last_probe: node.last_probe.as_ref().map(ProbeView::from),
                })
                .collect(),
            offline: report.offline.iter().map(OfflineView::from).collect(),
        }
    }
}

fn probe_body(body: &str) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(millis).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_node_defaults() {
        let body: NewNode = serde_json::from_value(json!({
            "name": "SNODE3",
            "uri": "http://127.0.0.1:3003"
        }))
        .unwrap();
        let record = body.into_record("/check");
        assert_eq!(record.health_check_path, "/check");
        assert!(record.online);
    }

    #[test]
    fn patch_body_maps_wire_names() {
        let body: PatchBody = serde_json::from_value(json!({
            "status": false,
            "check_endpoint": "/health",
            "uri": ""
        }))
        .unwrap();
        let patch = NodePatch::from(body);
        assert_eq!(patch.online, Some(false));
        assert_eq!(patch.health_check_path.as_deref(), Some("/health"));
        assert_eq!(patch.uri, None);
        assert_eq!(patch.name, None);
    }

    #[test]
    fn node_view_uses_wire_names() {
        let node = NodeRecord::new("SNODE1", "http://127.0.0.1:3001", "/check").with_online(false);
        let value = serde_json::to_value(NodeView::from(&node)).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "SNODE1",
                "uri": "http://127.0.0.1:3001",
                "check_endpoint": "/check",
                "status": false
            })
        );
    }

    #[test]
    fn check_health_entry_reports_either_code_or_error() {
        let node = NodeRecord::new("a", "http://a", "/check");
        let ok = ProbeReport {
            at: SystemTime::now(),
            round_trip: Duration::from_millis(12),
            outcome: ProbeOutcome::Reachable {
                status: 200,
                body: String::new(),
            },
        };
        let value = serde_json::to_value(CheckHealthEntry::new(&node, true, &ok)).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["time"], 12);
        assert!(value.get("error").is_none());
        assert!(value.get("body").is_none());

        let failed = ProbeReport {
            outcome: ProbeOutcome::Unreachable { error: "refused".into() },
            ..ok
        };
        let value = serde_json::to_value(CheckHealthEntry::new(&node, false, &failed)).unwrap();
        assert_eq!(value["error"], "refused");
        assert!(value.get("statusCode").is_none());
    }

    #[test]
    fn check_health_entry_carries_the_probe_body() {
        let node = NodeRecord::new("a", "http://a", "/check");
        let report = |body: &str| ProbeReport {
            at: SystemTime::now(),
            round_trip: Duration::from_millis(3),
            outcome: ProbeOutcome::Reachable {
                status: 200,
                body: body.to_string(),
            },
        };

        let value = serde_json::to_value(CheckHealthEntry::new(&node, true, &report("{\"db\":\"ok\"}"))).unwrap();
        assert_eq!(value["body"], json!({ "db": "ok" }));

        let value = serde_json::to_value(CheckHealthEntry::new(&node, true, &report("pong"))).unwrap();
        assert_eq!(value["body"], "pong");
    }
}
