//! Miniproxy - A lightweight caching HTTP forward proxy
//!
//! Serves repeated requests from an in-memory LRU response cache and relays
//! everything else to the origin.

use std::env;
use std::process;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use miniproxy::cache::{CacheStore, SharedCache};
use miniproxy::config::Config;
use miniproxy::proxy::{bind_listener, serve};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables and the `[port]` argument
/// 3. Create the response cache with the configured byte budgets
/// 4. Bind the listening socket
/// 5. Accept connections until SIGINT/SIGTERM, then drain and exit
///
/// Startup failures (invalid cache budgets, bind/listen errors) exit
/// non-zero; an orderly shutdown exits zero.
#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "miniproxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting miniproxy");

    let config = Config::from_env().with_port_arg(env::args().skip(1));
    info!(
        "Configuration loaded: port={}, cache_budget={} bytes, entry_cap={} bytes, backlog={}",
        config.port, config.max_cache_bytes, config.max_object_bytes, config.backlog
    );

    let store = match CacheStore::new(config.max_cache_bytes, config.max_object_bytes) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize cache: {}", e);
            process::exit(1);
        }
    };
    let cache = SharedCache::new(store);
    info!("Response cache initialized");

    let listener = match bind_listener(&config) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind port {}: {}", config.port, e);
            process::exit(1);
        }
    };
    info!("Proxy listening on port {}", config.port);

    serve(listener, cache, config).await;

    info!("Server shutdown complete");
}
