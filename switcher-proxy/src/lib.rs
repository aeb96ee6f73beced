//! Switcher Proxy Engine
//!
//! The Tokio async front end of the Switcher load balancer: environment
//! configuration, the HTTP/1.1 listener with optional TLS termination, and the
//! pooled upstream client that forwards requests and runs health probes.

pub mod config;
pub mod connection_pool;
pub mod error;
pub mod health_check;
pub mod server;
pub mod tls;
pub mod upstream;

pub use config::Config;
pub use server::{serve, start_server, App};
