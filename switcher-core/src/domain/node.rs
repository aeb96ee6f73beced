//! Backend node models.

use std::time::{Duration, SystemTime};

/// Represents a single upstream backend node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// The unique name of the node
    pub name: String,
    /// Base address requests are forwarded to, e.g. `http://10.0.0.4:3000`
    pub uri: String,
    /// Relative path probed for liveness
    pub health_check_path: String,
    /// Whether the node is currently eligible for dispatch
    pub online: bool,
    /// Outcome of the most recent health probe, if any ran yet
    pub last_probe: Option<ProbeReport>,
}

impl NodeRecord {
    /// Create a new node, assumed online until proven otherwise
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        health_check_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            health_check_path: health_check_path.into(),
            online: true,
            last_probe: None,
        }
    }

    /// Builder-style override of the initial online flag
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Full address for `path` on this node.
    pub fn url_for(&self, path: &str) -> String {
        join(&self.uri, path)
    }

    /// Full address of the liveness probe.
    pub fn health_check_url(&self) -> String {
        join(&self.uri, &self.health_check_path)
    }

    /// Apply only the fields set on `patch`.
    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(uri) = &patch.uri {
            self.uri = uri.clone();
        }
        if let Some(path) = &patch.health_check_path {
            self.health_check_path = path.clone();
        }
        if let Some(online) = patch.online {
            self.online = online;
        }
    }
}

fn join(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !path.is_empty() => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// A partial update of a [`NodeRecord`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    /// New unique name
    pub name: Option<String>,
    /// New base address
    pub uri: Option<String>,
    /// New probe path
    pub health_check_path: Option<String>,
    /// New online flag
    pub online: Option<bool>,
}

impl NodePatch {
    /// True when the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.uri.is_none()
            && self.health_check_path.is_none()
            && self.online.is_none()
    }
}

/// The recorded result of one liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Wall clock time the probe started
    pub at: SystemTime,
    /// Time until the probe resolved, successfully or not
    pub round_trip: Duration,
    /// What happened
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    /// Whether the node answered at all.
    pub fn is_reachable(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Reachable { .. })
    }
}

/// What a node answered to a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAnswer {
    /// HTTP status code
    pub status: u16,
    /// Response body, decoded lossily as UTF-8
    pub body: String,
}

impl ProbeAnswer {
    /// An answer with a status code and a body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

impl From<u16> for ProbeAnswer {
    fn from(status: u16) -> Self {
        Self::new(status, String::new())
    }
}

/// Result of a probe. Any HTTP answer counts as reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The node answered with the given HTTP status code
    Reachable {
        /// Status code of the probe response
        status: u16,
        /// Body of the probe response
        body: String,
    },
    /// The node could not be reached
    Unreachable {
        /// Rendered transport error
        error: String,
    },
}
