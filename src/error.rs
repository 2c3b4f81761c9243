//! Error types for the proxy
//!
//! Provides unified error handling using thiserror.
//!
//! A cache lookup that finds nothing is not an error; it is `None`. An
//! oversize insert is silently dropped by the store. Everything else a worker
//! can hit is one of the variants below, each of which maps to the HTTP error
//! envelope sent to the client when no response bytes have gone out yet.

use thiserror::Error;

// == Proxy Error Enum ==
/// Unified error type for the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid startup parameters (cache budgets, listener setup)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The client sent something we could not parse or use
    #[error("Bad request: {0}")]
    Request(String),

    /// DNS resolution, dial, or I/O toward the origin failed
    #[error("Origin unreachable: {0}")]
    Origin(String),

    /// An allocation inside the worker failed
    #[error("Out of memory: {0}")]
    Resource(String),

    /// I/O toward the client failed
    #[error("Client I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    // == Status Mapping ==
    /// The `(code, reason)` pair of the error envelope for this error, or
    /// None when no response should be written (client-side I/O failures are
    /// abandoned silently).
    pub fn status(&self) -> Option<(u16, &'static str)> {
        match self {
            ProxyError::Request(_) => Some((400, "Bad Request")),
            ProxyError::Resource(_) => Some((500, "Internal Server Error")),
            ProxyError::Origin(_) => Some((502, "Bad Gateway")),
            ProxyError::Config(_) | ProxyError::Io(_) => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the proxy.
pub type Result<T> = std::result::Result<T, ProxyError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::Request("bad".into()).status(),
            Some((400, "Bad Request"))
        );
        assert_eq!(
            ProxyError::Resource("oom".into()).status(),
            Some((500, "Internal Server Error"))
        );
        assert_eq!(
            ProxyError::Origin("refused".into()).status(),
            Some((502, "Bad Gateway"))
        );
    }

    #[test]
    fn test_no_envelope_for_config_and_client_io() {
        assert!(ProxyError::Config("zero".into()).status().is_none());
        let io = ProxyError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "client gone",
        ));
        assert!(io.status().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::Origin("connection refused".into());
        assert_eq!(err.to_string(), "Origin unreachable: connection refused");
    }
}
