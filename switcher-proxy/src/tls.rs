//! TLS termination for the Switcher listener.
//!
//! Loads a PEM certificate chain and private key into a
//! `rustls::ServerConfig` and wraps it in an acceptor for incoming
//! connections.

use pki_types::CertificateDer;
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::error::TlsError;

/// Loads a TLS `ServerConfig` from the given certificate and key paths.
pub fn load_tls_config<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsError::Io { path, source }
    };

    let cert_file = File::open(cert_path).map_err(io_error(cert_path))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error(cert_path))?;

    let key_file = File::open(key_path).map_err(io_error(key_path))?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(io_error(key_path))?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    // Connections are served with hyper's HTTP/1 builder only.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Build an acceptor from the given certificate and key paths.
pub fn acceptor<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<TlsAcceptor, TlsError> {
    load_tls_config(cert_path, key_path).map(TlsAcceptor::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_name_the_path() {
        let err = load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"), "{}", err);
    }

    #[test]
    fn key_file_without_key_is_rejected() {
        let dir = std::env::temp_dir().join(format!("switcher-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("cert.pem");
        let key = dir.join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();

        let err = load_tls_config(&cert, &key).unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)), "{}", err);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
