//! Active HTTP health probes.

use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::Method;

use switcher_core::{HealthProbe, NodeRecord, ProbeAnswer, TransportError};

use crate::upstream::HttpUpstream;

impl HealthProbe for HttpUpstream {
    /// GET the node's check path. Any HTTP answer means the node is reachable;
    /// the status code and body are only reported.
    async fn probe(&self, node: &NodeRecord) -> Result<ProbeAnswer, TransportError> {
        let response = self
            .send(
                &node.health_check_url(),
                Method::GET,
                &HeaderMap::new(),
                Bytes::new(),
                self.probe_timeout,
            )
            .await?;
        let status = response.status().as_u16();
        let body = response.into_body().collect().await.map_err(|e| match e {})?.to_bytes();
        Ok(ProbeAnswer::new(status, String::from_utf8_lossy(&body)))
    }
}
