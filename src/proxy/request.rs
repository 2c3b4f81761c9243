//! Request Parsing Module
//!
//! Parses the head of an HTTP/1.x proxy request and re-serializes it in the
//! origin form. A forward proxy receives the target in the request line as an
//! absolute URI (`GET http://host:port/path HTTP/1.1`); the origin expects
//! `GET /path HTTP/1.0`.
//!
//! The parsed pieces also produce the cache fingerprint
//! `{protocol}://{host}:{port}{path}`. The fingerprint is byte-exact: no case
//! folding, no percent-decoding, no default-port elision. Two spellings of
//! the same resource are two cache entries.

use std::collections::TryReserveError;

use crate::error::{ProxyError, Result};

// == Parsed Request ==
/// A parsed HTTP request head.
///
/// The port is kept as the literal string from the request (defaulted to
/// `"80"` when absent) so the fingerprint reproduces the request spelling
/// exactly; a non-numeric port surfaces later as a dial failure.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// Request method, e.g. `GET`
    pub method: String,
    /// URI scheme, defaulting to `http`
    pub protocol: String,
    /// Target host from the absolute URI; empty when the URI was relative
    pub host: String,
    /// Target port as written, `"80"` when absent
    pub port: String,
    /// Request path, defaulting to `/`
    pub path: String,
    /// HTTP version token, e.g. `HTTP/1.1`
    pub version: String,
    /// Headers in arrival order; keys compare case-insensitively
    headers: Vec<(String, String)>,
}

impl ParsedRequest {
    // == Parse ==
    /// Parses a request head (request line plus header block).
    ///
    /// # Arguments
    /// * `raw` - The bytes read from the client, starting at the request line
    ///
    /// # Errors
    /// Returns [`ProxyError::Request`] when the head is not ASCII-clean UTF-8,
    /// has no complete request line, or the request line has fewer than three
    /// tokens.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let head = std::str::from_utf8(raw)
            .map_err(|_| ProxyError::Request("request head is not valid UTF-8".to_string()))?;

        let (request_line, rest) = head
            .split_once("\r\n")
            .ok_or_else(|| ProxyError::Request("missing request line terminator".to_string()))?;

        let mut tokens = request_line.splitn(3, ' ');
        let method = tokens
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProxyError::Request("empty request line".to_string()))?;
        let uri = tokens
            .next()
            .ok_or_else(|| ProxyError::Request("request line has no URI".to_string()))?;
        let version = tokens
            .next()
            .ok_or_else(|| ProxyError::Request("request line has no version".to_string()))?;

        let (protocol, host, port, path) = split_uri(uri);

        let mut request = Self {
            method: method.to_string(),
            protocol,
            host,
            port,
            path,
            version: version.to_string(),
            headers: Vec::new(),
        };

        // Header block: one `Key: value` per line until the blank line.
        // Lines without a colon are skipped, like any other junk.
        for line in rest.split("\r\n") {
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                request.set_header(key, value.trim_start_matches(' '));
            }
        }

        Ok(request)
    }

    // == Fingerprint ==
    /// Cache identity of this request: `{protocol}://{host}:{port}{path}`.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol, self.host, self.port, self.path
        )
    }

    // == Headers ==
    /// Returns the value of `key`, comparing case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key` to `value`, overwriting in place when the key is already
    /// present (case-insensitively) and appending otherwise.
    pub fn set_header(&mut self, key: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    // == Origin Rewrite ==
    /// Rewrites the request for forwarding: pins `Host`, forces
    /// `Connection: close`, and downgrades the version to HTTP/1.0.
    pub fn rewrite_for_origin(&mut self) {
        let host = self.host.clone();
        self.set_header("Host", &host);
        self.set_header("Connection", "close");
        self.version = "HTTP/1.0".to_string();
    }

    // == Serialization ==
    /// Serializes the request in origin form: `METHOD SP path SP version`,
    /// the header block, and the terminating blank line. The path is sent
    /// alone, not the absolute URI.
    ///
    /// The buffer is reserved up front from the exact serialized length;
    /// a failed allocation is returned to the caller instead of aborting.
    pub fn to_origin_bytes(&self) -> std::result::Result<Vec<u8>, TryReserveError> {
        // "METHOD SP path SP version CRLF", "key: value CRLF" per header,
        // and the final CRLF.
        let mut needed = self.method.len() + self.path.len() + self.version.len() + 4;
        for (key, value) in &self.headers {
            needed += key.len() + value.len() + 4;
        }
        needed += 2;

        let mut out = Vec::new();
        out.try_reserve_exact(needed)?;

        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (key, value) in &self.headers {
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        Ok(out)
    }
}

// == URI Splitting ==
/// Splits a request-line URI into `(protocol, host, port, path)`.
///
/// `protocol://` is optional and defaults to `http`; the path starts at the
/// first `/` of the remainder and defaults to `/`; the port is whatever
/// follows the first `:` of the authority and defaults to `"80"`. A relative
/// URI yields an empty host, which the worker rejects.
fn split_uri(uri: &str) -> (String, String, String, String) {
    let (protocol, remainder) = match uri.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ("http".to_string(), uri),
    };

    let (authority, path) = match remainder.find('/') {
        Some(idx) => (&remainder[..idx], remainder[idx..].to_string()),
        None => (remainder, "/".to_string()),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (authority.to_string(), "80".to_string()),
    };

    (protocol, host, port, path)
}
