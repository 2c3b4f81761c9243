//! Proxy Server Module
//!
//! Listener setup and the accept loop. Each accepted connection is served by
//! its own tokio task; the tasks share nothing but the cache handle.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::Result;
use crate::proxy::worker::handle_connection;

// == Listener Setup ==
/// Binds the listening socket on all interfaces with address reuse and the
/// configured backlog.
pub fn bind_listener(config: &Config) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(config.backlog)?)
}

// == Accept Loop ==
/// Accepts connections until a shutdown signal arrives, spawning one worker
/// task per client.
///
/// On shutdown the cache is emptied and a final statistics line is logged.
/// In-flight workers are detached; the process exits once the runtime drops.
pub async fn serve(listener: TcpListener, cache: SharedCache, config: Config) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let cache = cache.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, cache, config).await;
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    let stats = cache.stats().await;
    info!(
        "final cache stats: {} hits, {} misses, {} insertions, {} evictions, hit rate {:.2}",
        stats.hits,
        stats.misses,
        stats.insertions,
        stats.evictions,
        stats.hit_rate()
    );
    cache.clear().await;
}

// == Shutdown Signal ==
/// Waits for shutdown (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;

    #[tokio::test]
    async fn test_bind_listener_on_free_port() {
        // Port 0 lets the OS choose; startup must succeed and report the
        // bound address.
        let config = Config {
            port: 0,
            ..Config::default()
        };

        let listener = bind_listener(&config).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_listener_conflict_fails() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let listener = bind_listener(&config).unwrap();
        let taken = listener.local_addr().unwrap().port();

        // SO_REUSEADDR does not permit two live listeners on one port.
        let conflicting = Config {
            port: taken,
            ..Config::default()
        };
        assert!(bind_listener(&conflicting).is_err());
    }

    #[tokio::test]
    async fn test_serve_accepts_connections() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let listener = bind_listener(&config).unwrap();
        let addr = listener.local_addr().unwrap();
        let cache = SharedCache::new(CacheStore::new(1024, 512).unwrap());
        cache.insert("http://served.test:80/", b"HTTP/1.0 200 OK\r\n\r\nok").await;

        let server = tokio::spawn(serve(listener, cache.clone(), config));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client
            .write_all(b"GET http://served.test/ HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"HTTP/1.0 200 OK\r\n\r\nok");

        server.abort();
    }
}
