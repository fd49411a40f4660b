//! Common test utilities for integration tests.
//!
//! Provides `StatusServer`, a minimal HTTP server answering every request
//! with a fixed status code, plus helpers for building a supervisor with
//! fast timeouts against a temporary log directory.
//!
//! # Example
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_probe() {
//!     let server = StatusServer::start(200).await;
//!     let spec = AppSpec::new("web", "Web", "/tmp")
//!         .with_probe(HealthProbe::new(server.url("/healthz")));
//!     // ...
//! }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use appdock::{Supervisor, SupervisorConfig};

/// A test HTTP server answering every request with one fixed status.
///
/// The server is shut down when dropped.
pub struct StatusServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the accept loop.
    server_handle: JoinHandle<()>,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl StatusServer {
    /// Bind an ephemeral loopback port and serve `status` on it.
    pub async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read test server addr");
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        let Ok((stream, _remote_addr)) = accept_result else {
                            break;
                        };
                        let io = TokioIo::new(stream);
                        tokio::spawn(async move {
                            let service =
                                service_fn(move |_req: Request<hyper::body::Incoming>| async move {
                                    Ok::<_, hyper::Error>(
                                        Response::builder()
                                            .status(status)
                                            .body(Full::new(Bytes::from("ok")))
                                            .unwrap(),
                                    )
                                });
                            // Connection errors are expected during shutdown.
                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            server_handle,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Port the server is listening on.
    #[allow(dead_code)]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Build a URL for the given path.
    #[allow(dead_code)]
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        format!("http://127.0.0.1:{}{}", self.addr.port(), path)
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.server_handle.abort();
    }
}

/// A loopback port with nothing listening on it.
///
/// Binds an ephemeral port and immediately releases it; nothing else is
/// likely to grab it within a test's lifetime.
#[allow(dead_code)]
#[must_use]
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("Failed to read addr").port();
    drop(listener);
    port
}

/// Supervisor configuration with fast timeouts and logs under `log_dir`.
#[allow(dead_code)]
#[must_use]
pub fn test_config(log_dir: &Path) -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.logs.dir = Some(log_dir.to_path_buf());
    config.health.poll_interval_secs = 1;
    config.health.check_timeout_secs = 2;
    config.health.quick_check_timeout_secs = 1;
    config.stop.grace_secs = 2;
    config
}

/// Supervisor wired for tests: fast timeouts, logs in `log_dir`.
#[allow(dead_code)]
#[must_use]
pub fn test_supervisor(log_dir: &Path) -> Supervisor {
    Supervisor::new(test_config(log_dir)).expect("Failed to build supervisor")
}

/// Polls `condition` every 50 ms until it holds or `timeout` elapses.
#[allow(dead_code)]
pub async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
