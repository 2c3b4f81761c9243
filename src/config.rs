//! Configuration Module
//!
//! Handles loading and managing proxy configuration.
//!
//! Every limit has a compiled-in default; the environment can override each
//! one, and the positional `[port]` command-line argument takes precedence
//! over the port from the environment.

use std::env;

// == Defaults ==
/// Total byte budget of the response cache (200 MiB).
pub const DEFAULT_MAX_CACHE_BYTES: usize = 200 * 1024 * 1024;

/// Largest single response the cache will admit (10 MiB).
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 10 * 1024 * 1024;

/// Port the proxy listens on when none is given.
pub const DEFAULT_PORT: u16 = 8080;

/// Listen backlog for the accepting socket.
pub const DEFAULT_ACCEPT_BACKLOG: u32 = 100;

/// Budget for reading a client's request head, and the size of the scratch
/// buffer used to relay origin bytes.
pub const DEFAULT_BUFFER_BYTES: usize = 8192;

/// Proxy configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total byte budget of the response cache
    pub max_cache_bytes: usize,
    /// Largest single response the cache will admit
    pub max_object_bytes: usize,
    /// Port to listen on
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Request-read budget and relay scratch buffer size
    pub buffer_bytes: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_CACHE_BYTES` - Total cache budget in bytes (default: 200 MiB)
    /// - `MAX_OBJECT_BYTES` - Per-entry cap in bytes (default: 10 MiB)
    /// - `PROXY_PORT` - Listen port (default: 8080)
    /// - `ACCEPT_BACKLOG` - Listen backlog (default: 100)
    /// - `READ_BUFFER_BYTES` - Request/relay buffer size (default: 8192)
    pub fn from_env() -> Self {
        Self {
            max_cache_bytes: env::var("MAX_CACHE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CACHE_BYTES),
            max_object_bytes: env::var("MAX_OBJECT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_OBJECT_BYTES),
            port: env::var("PROXY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            backlog: env::var("ACCEPT_BACKLOG")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ACCEPT_BACKLOG),
            buffer_bytes: env::var("READ_BUFFER_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BUFFER_BYTES),
        }
    }

    // == CLI Port ==
    /// Applies the positional `[port]` argument, if one was given and valid.
    ///
    /// A missing or invalid argument (non-decimal, zero, out of range) leaves
    /// the configured port untouched.
    pub fn with_port_arg<I>(mut self, mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        if let Some(port) = args.next().and_then(|arg| parse_port(&arg)) {
            self.port = port;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
            port: DEFAULT_PORT,
            backlog: DEFAULT_ACCEPT_BACKLOG,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
        }
    }
}

/// Parses a decimal port in `[1, 65535]`; anything else is None.
fn parse_port(arg: &str) -> Option<u16> {
    match arg.parse::<u16>() {
        Ok(0) => None,
        Ok(port) => Some(port),
        Err(_) => None,
    }
}
