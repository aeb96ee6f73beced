//! Startup and server errors of the proxy.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use switcher_core::RegistryError;

/// Invalid environment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is set to a value that cannot be used
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// One variable of a pair is set without the other
    #[error("{0} is set but {1} is not")]
    Incomplete(&'static str, &'static str),

    /// The declared nodes do not form a valid pool
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failure loading TLS material.
#[derive(Error, Debug)]
pub enum TlsError {
    /// A certificate or key file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The key file holds no private key
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// rustls rejected the certificate chain or key
    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Failure running the listener.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: io::Error,
    },

    /// The bound socket could not report its address
    #[error("failed to get local addr: {0}")]
    LocalAddr(io::Error),
}
