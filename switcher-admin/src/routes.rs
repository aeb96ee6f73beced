//! Admin route table.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use switcher_core::{Balancer, HealthProbe, NodePatch, RegistryError, Upstream};

use crate::auth::ApiKey;
use crate::model::{CheckHealthEntry, DescribeView, NewNode, NodeView, PatchBody};

/// Path prefix of every admin route.
pub const ADMIN_PREFIX: &str = "/switcher-balance";

/// Probe path used when a new node does not name one.
pub const DEFAULT_CHECK_PATH: &str = "/check";

/// Answer of an admin route.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl AdminResponse {
    fn json(status: u16, body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status,
                body: Some(body),
            },
            Err(e) => Self::error(500, &e.to_string()),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({ "error": message })),
        }
    }

    fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    /// The body rendered as bytes; empty when there is no body.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.body
            .as_ref()
            .map(|body| body.to_string().into_bytes())
            .unwrap_or_default()
    }
}

enum Route<'a> {
    Check,
    CheckHealth,
    Describe,
    Create,
    Update(&'a str),
    Delete(&'a str),
}

impl<'a> Route<'a> {
    fn parse(method: &str, path: &'a str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or_default();
        let rest = path.strip_prefix(ADMIN_PREFIX)?;
        let rest = rest.trim_end_matches('/');
        let segment = match rest {
            "" => None,
            other => Some(other.strip_prefix('/')?),
        };
        if segment.is_some_and(|s| s.contains('/') || s.is_empty()) {
            return None;
        }

        match (method, segment) {
            ("GET", None) => Some(Route::Describe),
            ("POST", None) => Some(Route::Create),
            ("GET", Some("check")) => Some(Route::Check),
            ("GET", Some("checkhealth")) => Some(Route::CheckHealth),
            ("PATCH", Some(name)) => Some(Route::Update(name)),
            ("DELETE", Some(name)) => Some(Route::Delete(name)),
            _ => None,
        }
    }

    fn needs_key(&self) -> bool {
        !matches!(self, Route::Check)
    }
}

/// The admin surface over one balancer.
pub struct AdminApi<U, P> {
    balancer: Arc<Balancer<U, P>>,
    key: ApiKey,
    default_check_path: String,
}

impl<U: Upstream, P: HealthProbe> AdminApi<U, P> {
    /// Serve admin routes for `balancer`, guarded by `key`.
    pub fn new(balancer: Arc<Balancer<U, P>>, key: ApiKey) -> Self {
        Self {
            balancer,
            key,
            default_check_path: DEFAULT_CHECK_PATH.to_string(),
        }
    }

    /// Probe path given to nodes created without one.
    pub fn with_default_check_path(mut self, path: impl Into<String>) -> Self {
        self.default_check_path = path.into();
        self
    }

    /// Whether `path` belongs to the admin surface rather than to the pool.
    pub fn owns(path: &str) -> bool {
        path.strip_prefix(ADMIN_PREFIX)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Handle one admin request.
    pub async fn handle(&self, method: &str, path: &str, api_key: Option<&str>, body: &[u8]) -> AdminResponse {
        let Some(route) = Route::parse(method, path) else {
            return AdminResponse::empty(404);
        };
        if route.needs_key() && !self.key.verify(api_key) {
            debug!("Rejected admin request {} {}", method, path);
            return AdminResponse::error(401, "Invalid API Key");
        }

        match route {
            Route::Check => AdminResponse::json(200, json!({ "message": "All good", "code": 200 })),
            Route::CheckHealth => self.check_health().await,
            Route::Describe => AdminResponse::json(200, DescribeView::from(&self.balancer.describe())),
            Route::Create => self.create(body),
            Route::Update(name) => self.update(name, body),
            Route::Delete(name) => self.delete(name),
        }
    }

    async fn check_health(&self) -> AdminResponse {
        let results = self.balancer.check_health().await;
        let entries: Vec<CheckHealthEntry> = results
            .iter()
            .map(|(node, report)| {
                let online = self.balancer.node(&node.name).map_or(node.online, |n| n.online);
                CheckHealthEntry::new(node, online, report)
            })
            .collect();
        AdminResponse::json(200, entries)
    }

    fn create(&self, body: &[u8]) -> AdminResponse {
        let new_node: NewNode = match serde_json::from_slice(body) {
            Ok(node) => node,
            Err(e) => return AdminResponse::error(400, &format!("Invalid body: {}", e)),
        };

        match self
            .balancer
            .add_node(new_node.into_record(&self.default_check_path))
        {
            Ok(node) => AdminResponse::json(200, NodeView::from(&node)),
            Err(e) => AdminResponse::error(400, &e.to_string()),
        }
    }

    fn update(&self, name: &str, body: &[u8]) -> AdminResponse {
        let patch: PatchBody = if body.iter().all(u8::is_ascii_whitespace) {
            PatchBody::default()
        } else {
            match serde_json::from_slice(body) {
                Ok(patch) => patch,
                Err(e) => return AdminResponse::error(400, &format!("Invalid body: {}", e)),
            }
        };

        match self.balancer.update_node(name, &NodePatch::from(patch)) {
            Ok(node) => {
                info!("Updated node {}", name);
                AdminResponse::json(200, NodeView::from(&node))
            }
            Err(RegistryError::NotFound(_)) => AdminResponse::empty(404),
            Err(e @ RegistryError::DuplicateName(_)) => AdminResponse::error(400, &e.to_string()),
        }
    }

    fn delete(&self, name: &str) -> AdminResponse {
        match self.balancer.remove_node(name) {
            Ok(node) => AdminResponse::json(200, vec![NodeView::from(&node)]),
            Err(_) => AdminResponse::empty(404),
        }
    }
}
