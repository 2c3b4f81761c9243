//! Connection Worker Module
//!
//! Serves one client connection from start to finish:
//!
//! ```text
//! read request -> parse -> fingerprint -> cache lookup
//!   hit  -> write cached bytes -> done
//!   miss -> dial origin -> rewrite + send -> relay loop -> maybe insert -> done
//! error -> error envelope (only if nothing was sent yet) -> done
//! ```
//!
//! On a miss the relay loop streams origin chunks to the client while
//! accumulating them into a capture buffer; at origin EOF the capture is
//! inserted into the cache. The client always wins: a client write failure
//! aborts the relay and discards the capture, and a capture allocation
//! failure kills only the capture while streaming continues.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::proxy::request::ParsedRequest;

// == Connection Entry Point ==
/// Handles one accepted client connection.
///
/// Converts worker errors into the HTTP error envelope when the client has
/// not received any response bytes; client-side I/O failures are abandoned
/// silently.
pub async fn handle_connection<S>(mut client: S, cache: SharedCache, config: Config)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = serve_client(&mut client, &cache, &config).await {
        match err.status() {
            Some((code, reason)) => {
                debug!("request failed with {}: {}", code, err);
                if let Err(write_err) = write_error(&mut client, code, reason).await {
                    debug!("error envelope not delivered: {}", write_err);
                }
            }
            None => debug!("connection closed: {}", err),
        }
    }
}

// == Request State Machine ==
/// Runs the per-request state machine against one client stream.
async fn serve_client<S>(client: &mut S, cache: &SharedCache, config: &Config) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(client, config.buffer_bytes).await?;

    let mut request = ParsedRequest::parse(&head)?;
    if request.host.is_empty() {
        return Err(ProxyError::Request(
            "request line carries no host".to_string(),
        ));
    }

    let fingerprint = request.fingerprint();
    info!("request: {}", fingerprint);

    if let Some(payload) = cache.lookup(&fingerprint).await {
        info!("cache hit: {} ({} bytes)", fingerprint, payload.len());
        client.write_all(&payload).await?;
        return Ok(());
    }

    info!("cache miss: {}", fingerprint);
    relay_from_origin(client, &mut request, &fingerprint, cache, config).await
}

// == Request Read ==
/// Reads the client's request head into an owned buffer.
///
/// Accumulates until the blank line that ends the header block, within a
/// fixed byte budget. Immediate EOF is a quiet close; EOF mid-head or a
/// head that never terminates within the budget is a client request error.
async fn read_request_head<S>(client: &mut S, budget: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; budget];
    let mut filled = 0;

    loop {
        if filled == budget {
            return Err(ProxyError::Request(format!(
                "request head exceeds {} bytes",
                budget
            )));
        }

        let n = client
            .read(&mut buf[filled..])
            .await
            .map_err(|e| ProxyError::Request(format!("recv failed: {}", e)))?;
        if n == 0 {
            if filled == 0 {
                // The client connected and went away; nothing to answer.
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            return Err(ProxyError::Request("truncated request head".to_string()));
        }
        filled += n;

        if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            buf.truncate(filled);
            return Ok(buf);
        }
    }
}

// == Origin Relay ==
/// Dials the origin, forwards the rewritten request, and relays the response
/// while capturing it for insertion.
async fn relay_from_origin<S>(
    client: &mut S,
    request: &mut ParsedRequest,
    fingerprint: &str,
    cache: &SharedCache,
    config: &Config,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let addr = format!("{}:{}", request.host, request.port);

    // connect() resolves the host name; DNS and dial failures both land here.
    let mut origin = TcpStream::connect(&addr)
        .await
        .map_err(|e| ProxyError::Origin(format!("connect to {}: {}", addr, e)))?;

    request.rewrite_for_origin();
    let origin_request = request
        .to_origin_bytes()
        .map_err(|e| ProxyError::Resource(format!("origin request buffer: {}", e)))?;
    origin
        .write_all(&origin_request)
        .await
        .map_err(|e| ProxyError::Origin(format!("send to {}: {}", addr, e)))?;

    let mut scratch = vec![0u8; config.buffer_bytes];
    let mut capture: Option<Vec<u8>> = Some(Vec::new());
    let mut sent_any = false;

    loop {
        let n = match origin.read(&mut scratch).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                // A failed relay never inserts. The envelope is only owed
                // while the client has received nothing.
                return if sent_any {
                    Err(ProxyError::Io(e))
                } else {
                    Err(ProxyError::Origin(format!("read from {}: {}", addr, e)))
                };
            }
        };

        // The client write comes first; if the client is gone, the relay is
        // over and the capture is discarded with no partial insert.
        client.write_all(&scratch[..n]).await?;
        sent_any = true;

        if let Some(buf) = capture.as_mut() {
            if !append_to_capture(buf, &scratch[..n]) {
                warn!("capture dropped for {}: buffer growth failed", fingerprint);
                capture = None;
            }
        }
    }

    if let Some(buf) = capture {
        if !buf.is_empty() {
            cache.insert(fingerprint, &buf).await;
        }
    }

    Ok(())
}

// == Capture Growth ==
/// Appends `chunk` to the capture buffer, doubling capacity to at least the
/// accumulated size on each grow. Returns false when the allocation fails,
/// at which point the caller abandons capturing for the rest of the request.
fn append_to_capture(buf: &mut Vec<u8>, chunk: &[u8]) -> bool {
    let needed = buf.len() + chunk.len();
    if buf.capacity() < needed {
        let target = needed * 2;
        if buf.try_reserve_exact(target - buf.len()).is_err() {
            return false;
        }
    }
    buf.extend_from_slice(chunk);
    true
}

// == Error Envelope ==
/// Writes the fixed-form HTTP error response:
/// `HTTP/1.0 <code> <reason>\r\nContent-Length: 0\r\nConnection: close\r\n\r\n`
pub async fn write_error<S>(client: &mut S, code: u16, reason: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let envelope = format!(
        "HTTP/1.0 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        code, reason
    );
    client.write_all(envelope.as_bytes()).await
}
