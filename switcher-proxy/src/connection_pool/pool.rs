//! Lock-free hot pool implementation using DashMap and SegQueue.

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use std::sync::Arc;

/// Sender half of an HTTP/1.1 connection to a node.
pub type UpstreamSender = SendRequest<Full<Bytes>>;

/// A lock-free pool caching idle connections to nodes, keyed by `host:port`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPool {
    idle_connections: Arc<DashMap<String, Arc<SegQueue<UpstreamSender>>>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to pop an idle sender to the given node address.
    ///
    /// Callers still have to await `ready()` before using it.
    pub fn try_pop(&self, addr: &str) -> Option<UpstreamSender> {
        let queue = self.idle_connections.get(addr)?.value().clone();
        while let Some(sender) = queue.pop() {
            if !sender.is_closed() {
                return Some(sender);
            }
        }
        None
    }

    /// Pushes a sender back into the pool for reuse. Closed senders are dropped.
    pub fn push(&self, addr: &str, sender: UpstreamSender) {
        if sender.is_closed() {
            return;
        }

        let queue = self
            .idle_connections
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(SegQueue::new()))
            .value()
            .clone();

        queue.push(sender);
    }

    /// Number of idle senders held for `addr`, closed ones included.
    pub fn idle(&self, addr: &str) -> usize {
        self.idle_connections
            .get(addr)
            .map_or(0, |queue| queue.value().len())
    }

    /// Drops every idle sender to `addr`.
    pub fn evict(&self, addr: &str) {
        self.idle_connections.remove(addr);
    }
}
