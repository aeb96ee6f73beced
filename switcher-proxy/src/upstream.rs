//! HTTP transport towards the nodes.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use switcher_core::{NodeRecord, TransportError, Upstream};

use crate::connection_pool::pool::{ConnectionPool, UpstreamSender};

/// Headers that describe one connection and are never relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Where a connection goes and whether it is wrapped in TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    secure: bool,
    host: String,
    port: u16,
}

impl Endpoint {
    fn parse(target: &Uri) -> Option<Self> {
        let secure = match target.scheme_str()? {
            "http" => false,
            "https" => true,
            _ => return None,
        };
        let authority = target.authority()?;
        Some(Self {
            secure,
            host: authority.host().to_string(),
            port: authority.port_u16().unwrap_or(if secure { 443 } else { 80 }),
        })
    }

    /// Pool key. Plain and TLS connections to one address are kept apart.
    fn key(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn server_name(&self) -> Option<ServerName<'static>> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        ServerName::try_from(host.to_string()).ok()
    }
}

/// Client TLS settings trusting the platform's root certificates.
pub fn native_roots_client_config() -> ClientConfig {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        warn!("Error loading native root certificate: {}", err);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    if ignored > 0 {
        warn!("Ignored {} unparsable root certificates", ignored);
    }
    if added == 0 {
        warn!("No native root certificates found, https nodes will fail verification");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}

/// An inbound request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Request method
    pub method: Method,
    /// Path and query, appended verbatim to the node address
    pub path: String,
    /// Inbound headers
    pub headers: HeaderMap,
    /// Inbound body
    pub body: Bytes,
}

/// Upstream response as relayed to the caller.
pub type ProxyResponse = Response<Full<Bytes>>;

/// Pooled HTTP/1.1 client used both for forwarding and for probes.
///
/// `http://` nodes are reached over plain TCP, `https://` nodes through
/// rustls.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    pool: ConnectionPool,
    tls: Arc<ClientConfig>,
    request_timeout: Duration,
    pub(crate) probe_timeout: Duration,
}

impl HttpUpstream {
    /// Create a client with the given bounds for forwarded requests and probes.
    pub fn new(request_timeout: Duration, probe_timeout: Duration) -> Self {
        Self::with_tls(request_timeout, probe_timeout, Arc::new(native_roots_client_config()))
    }

    /// Create a client that verifies `https://` nodes with the given settings.
    pub fn with_tls(request_timeout: Duration, probe_timeout: Duration, tls: Arc<ClientConfig>) -> Self {
        Self {
            pool: ConnectionPool::new(),
            tls,
            request_timeout,
            probe_timeout,
        }
    }

    /// Send one request to `url` and buffer the response.
    pub async fn send(
        &self,
        url: &str,
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
        timeout: Duration,
    ) -> Result<ProxyResponse, TransportError> {
        let target: Uri = url
            .parse()
            .map_err(|_| TransportError::InvalidTarget(url.to_string()))?;
        let endpoint = Endpoint::parse(&target).ok_or_else(|| TransportError::InvalidTarget(url.to_string()))?;
        let authority = target
            .authority()
            .ok_or_else(|| TransportError::InvalidTarget(url.to_string()))?;
        let path = target.path_and_query().map_or("/", |p| p.as_str());

        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            if *name != header::HOST && *name != header::CONTENT_LENGTH && !is_hop_by_hop(name) {
                builder = builder.header(name, value);
            }
        }
        let host = HeaderValue::from_str(authority.as_str())
            .map_err(|_| TransportError::InvalidTarget(url.to_string()))?;
        let request = builder
            .header(header::HOST, host)
            .body(Full::new(body))
            .map_err(|e| TransportError::Protocol(format!("failed to build request: {}", e)))?;

        let key = endpoint.key();
        let result = match time::timeout(timeout, self.exchange(&endpoint, &key, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        if result.is_err() {
            self.pool.evict(&key);
        }
        result
    }

    async fn exchange(
        &self,
        endpoint: &Endpoint,
        key: &str,
        request: Request<Full<Bytes>>,
    ) -> Result<ProxyResponse, TransportError> {
        let mut sender = self.checkout(endpoint, key).await?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{}: {}", key, e)))?;
        let (mut parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Protocol(format!("failed to read response from {}: {}", key, e)))?
            .to_bytes();

        self.pool.push(key, sender);

        for name in HOP_BY_HOP {
            parts.headers.remove(name);
        }
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Full::new(body)))
    }

    async fn checkout(&self, endpoint: &Endpoint, key: &str) -> Result<UpstreamSender, TransportError> {
        if let Some(mut sender) = self.pool.try_pop(key) {
            if sender.ready().await.is_ok() {
                return Ok(sender);
            }
            debug!("Discarding stale connection to {}", key);
        }
        self.connect(endpoint, key).await
    }

    async fn connect(&self, endpoint: &Endpoint, key: &str) -> Result<UpstreamSender, TransportError> {
        let stream = TcpStream::connect(endpoint.socket_addr())
            .await
            .map_err(|e| TransportError::Unreachable(format!("{}: {}", key, e)))?;

        if !endpoint.secure {
            return handshake(stream, key).await;
        }

        let server_name = endpoint
            .server_name()
            .ok_or_else(|| TransportError::InvalidTarget(key.to_string()))?;
        let stream = TlsConnector::from(self.tls.clone())
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{}: TLS handshake failed: {}", key, e)))?;
        handshake(stream, key).await
    }
}

async fn handshake<S>(stream: S, key: &str) -> Result<UpstreamSender, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| TransportError::Unreachable(format!("{}: {}", key, e)))?;

    let key = key.to_string();
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            debug!("Connection to {} closed: {:?}", key, err);
        }
    });
    Ok(sender)
}

impl Upstream for HttpUpstream {
    type Request = ProxyRequest;
    type Response = ProxyResponse;

    async fn forward(&self, node: &NodeRecord, request: &ProxyRequest) -> Result<ProxyResponse, TransportError> {
        self.send(
            &node.url_for(&request.path),
            request.method.clone(),
            &request.headers,
            request.body.clone(),
            self.request_timeout,
        )
        .await
    }
}
