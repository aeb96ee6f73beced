//! Server module for handling incoming connections and HTTP parsing.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use switcher_admin::{AdminApi, ApiKey, API_KEY_HEADER};
use switcher_core::{Balancer, RoutingTable};

use crate::config::Config;
use crate::error::{ConfigError, ServerError};
use crate::upstream::{HttpUpstream, ProxyRequest, ProxyResponse};

/// The balancer as wired to the HTTP transport.
pub type HttpBalancer = Balancer<HttpUpstream, HttpUpstream>;

/// Everything a connection needs to serve requests.
pub struct App {
    balancer: Arc<HttpBalancer>,
    admin: AdminApi<HttpUpstream, HttpUpstream>,
}

impl App {
    /// Wire a balancer and its admin surface together.
    pub fn new(balancer: Arc<HttpBalancer>, admin: AdminApi<HttpUpstream, HttpUpstream>) -> Self {
        Self { balancer, admin }
    }

    /// Build the whole application from configuration.
    pub fn from_config(config: &Config, key: ApiKey) -> Result<Arc<Self>, ConfigError> {
        for node in &config.nodes {
            info!("- Adding endpoint {}", node.uri);
        }
        let table = RoutingTable::from_nodes(config.nodes.clone())?;
        let upstream = Arc::new(HttpUpstream::new(config.upstream_timeout, config.probe_timeout));
        let balancer = Arc::new(Balancer::new(table, config.recovery, upstream.clone(), upstream));
        let admin = AdminApi::new(balancer.clone(), key).with_default_check_path(config.check_endpoint.clone());
        Ok(Arc::new(Self::new(balancer, admin)))
    }

    /// The balancer behind this application.
    pub fn balancer(&self) -> &HttpBalancer {
        &self.balancer
    }
}

/// Starts the proxy server on the given address.
pub async fn start_server(addr: SocketAddr, app: Arc<App>, tls_acceptor: Option<TlsAcceptor>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve(listener, app, tls_acceptor).await
}

/// Accepts connections on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, app: Arc<App>, tls_acceptor: Option<TlsAcceptor>) -> Result<(), ServerError> {
    let local = listener.local_addr().map_err(ServerError::LocalAddr)?;
    info!("Server is up on {}", local);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let app = app.clone();
        if let Some(acceptor) = &tls_acceptor {
            let acceptor = acceptor.clone();
            tokio::task::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(tls_stream, app).await,
                    Err(e) => warn!("TLS Handshake with {} failed: {}", peer, e),
                }
            });
        } else {
            tokio::task::spawn(serve_connection(stream, app));
        }
    }
}

async fn serve_connection<S>(stream: S, app: Arc<App>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| handle_request(app.clone(), req));
    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        error!("Error serving connection: {:?}", err);
    }
}

/// Serves admin routes locally and dispatches everything else to the pool.
async fn handle_request(app: Arc<App>, req: Request<Incoming>) -> Result<ProxyResponse, hyper::Error> {
    debug!("Received request: {} {}", req.method(), req.uri());

    let path = req
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), |p| p.as_str().to_string());

    if AdminApi::<HttpUpstream, HttpUpstream>::owns(req.uri().path()) {
        let method = req.method().clone();
        let key = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = req.into_body().collect().await?.to_bytes();

        let response = app.admin.handle(method.as_str(), &path, key.as_deref(), &body).await;
        return Ok(json_response(response.status, response.body_bytes()));
    }

    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    let request = ProxyRequest {
        method: parts.method,
        path,
        headers: parts.headers,
        body,
    };

    match app.balancer.dispatch(&request).await {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!("Dispatch of {} {} failed: {}", request.method, request.path, e);
            let body = json!({ "error": e.to_string() }).to_string().into_bytes();
            Ok(json_response(500, body))
        }
    }
}

fn json_response(status: u16, body: Vec<u8>) -> ProxyResponse {
    let has_body = !body.is_empty();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if has_body {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_sets_status_and_type() {
        let response = json_response(404, Vec::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());

        let response = json_response(500, b"{}".to_vec());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let config = Config::from_vars(Vec::<(String, String)>::new()).unwrap();
        let app = App::from_config(&config, ApiKey::generate()).unwrap();

        let err = start_server(addr, app, None).await.unwrap_err();
        assert!(err.to_string().contains(&addr.to_string()), "{}", err);
    }
}
