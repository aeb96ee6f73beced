//! Switcher load balancer
//!
//! Reads the environment, starts the multi-threaded Tokio runtime and serves
//! requests until interrupted.

#![deny(missing_docs)]

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use switcher_admin::ApiKey;
use switcher_proxy::{server, tls, App, Config};

/// The primary entrypoint for the Switcher load balancer.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(config.logger);

    info!("Starting Switcher load balancer...");

    let key = config
        .admin_key
        .clone()
        .map(ApiKey::new)
        .unwrap_or_else(ApiKey::generate);
    println!("API Key: {}", key.expose());

    let app = App::from_config(&config, key)?;
    let tls_acceptor = match &config.tls {
        Some(paths) => Some(tls::acceptor(&paths.cert, &paths.key)?),
        None => None,
    };

    tokio::select! {
        result = server::start_server(config.bind, app, tls_acceptor) => {
            if let Err(e) = result {
                error!("Server failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    info!("Shutting down gracefully.");
    Ok(())
}

/// `LOGGER=true` turns on diagnostics, filtered by `RUST_LOG` (default `info`).
/// Otherwise only errors are printed.
fn init_tracing(enabled: bool) {
    let filter = if enabled {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("error")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
