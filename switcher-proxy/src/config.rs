//! Environment configuration.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use switcher_core::{NodeRecord, RecoverySettings};

use crate::error::ConfigError;

/// Prefix of the variables declaring nodes, unless `NODE_PREFIX` overrides it.
pub const DEFAULT_NODE_PREFIX: &str = "SNODE";

/// Probe path of configured nodes, unless `CHECK_ENDPOINT` overrides it.
pub const DEFAULT_CHECK_ENDPOINT: &str = "/check";

/// Certificate and key of the TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// PEM certificate chain
    pub cert: PathBuf,
    /// PEM private key
    pub key: PathBuf,
}

/// Everything the proxy reads from its environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub bind: SocketAddr,
    /// Initial nodes, ordered by variable name
    pub nodes: Vec<NodeRecord>,
    /// Probe path of every node declared here
    pub check_endpoint: String,
    /// Recovery timing
    pub recovery: RecoverySettings,
    /// Whether diagnostic logging is on
    pub logger: bool,
    /// Bound on one forwarded request
    pub upstream_timeout: Duration,
    /// Bound on one health probe
    pub probe_timeout: Duration,
    /// TLS termination, when configured
    pub tls: Option<TlsPaths>,
    /// Fixed admin key; one is generated when absent
    pub admin_key: Option<String>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Read the configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| vars.get(key).map(String::as_str).filter(|v| !v.is_empty());

        let prefix = get("NODE_PREFIX").unwrap_or(DEFAULT_NODE_PREFIX);
        let check_endpoint = get("CHECK_ENDPOINT")
            .unwrap_or(DEFAULT_CHECK_ENDPOINT)
            .to_string();

        let interval = positive(&vars, "RECOVER_INTERVAL", 5)?;
        let window = positive(&vars, "RECOVER_ATTEMPT_DURATION", 60)?;
        // A window shorter than the interval would close before its first probe.
        if interval > window {
            return Err(ConfigError::Invalid {
                key: "RECOVER_INTERVAL",
                value: interval.to_string(),
                reason: format!("must not exceed RECOVER_ATTEMPT_DURATION ({})", window),
            });
        }
        let recovery = RecoverySettings {
            interval: Duration::from_secs(interval),
            window: Duration::from_secs(window),
        };

        let ip: IpAddr = parse(&vars, "BIND_ADDRESS", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port: u16 = parse(&vars, "PORT", 3000)?;

        let tls = match (get("TLS_CERT"), get("TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Incomplete("TLS_CERT", "TLS_KEY")),
            (None, Some(_)) => return Err(ConfigError::Incomplete("TLS_KEY", "TLS_CERT")),
        };

        let nodes = vars
            .iter()
            .filter(|(key, uri)| key.starts_with(prefix) && key.as_str() != "NODE_PREFIX" && !uri.is_empty())
            .map(|(key, uri)| NodeRecord::new(key.clone(), uri.clone(), check_endpoint.clone()))
            .collect();

        Ok(Self {
            bind: SocketAddr::new(ip, port),
            nodes,
            check_endpoint,
            recovery,
            logger: matches!(get("LOGGER"), Some("true") | Some("1")),
            upstream_timeout: Duration::from_millis(positive(&vars, "UPSTREAM_TIMEOUT_MS", 30_000)?),
            probe_timeout: Duration::from_millis(positive(&vars, "PROBE_TIMEOUT_MS", 1_500)?),
            tls,
            admin_key: get("ADMIN_KEY").map(str::to_string),
        })
    }
}

fn parse<T>(vars: &BTreeMap<String, String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn positive(vars: &BTreeMap<String, String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = parse(vars, key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
