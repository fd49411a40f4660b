//! Low-level reachability probes.
//!
//! Everything here answers a yes/no question about one endpoint and never
//! returns an error: a probe that cannot be performed is a probe that
//! failed. Diagnostic detail goes to the debug log.

use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Attempts one TCP connection to `host:port` within `connect_timeout`.
pub async fn try_connect(host: &str, port: u16, connect_timeout: Duration) -> bool {
    let socket_addr = match (host, port).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                debug!(host = %host, port = port, "TCP probe failed: no addresses resolved");
                return false;
            },
        },
        Err(e) => {
            debug!(host = %host, port = port, error = %e, "TCP probe failed: address resolution error");
            return false;
        },
    };

    match timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(_stream)) => {
            debug!(host = %host, port = port, "TCP probe passed");
            true
        },
        Ok(Err(e)) => {
            debug!(host = %host, port = port, error = %e, "TCP probe failed: connection error");
            false
        },
        Err(_) => {
            debug!(
                host = %host,
                port = port,
                timeout = ?connect_timeout,
                "TCP probe failed: connection timeout"
            );
            false
        },
    }
}

/// True when something accepts TCP connections on the loopback port, over
/// either address family. Servers bound only to `::1` count as reachable.
pub async fn loopback_port_reachable(port: u16, connect_timeout: Duration) -> bool {
    try_connect("127.0.0.1", port, connect_timeout).await
        || try_connect("::1", port, connect_timeout).await
}

/// Repeats [`try_connect`] up to `attempts` times, returning on the first
/// success.
pub async fn tcp_reachable(host: &str, port: u16, connect_timeout: Duration, attempts: u32) -> bool {
    for _ in 0..attempts {
        if try_connect(host, port, connect_timeout).await {
            return true;
        }
    }
    false
}

/// Sends a GET request and reports whether the endpoint looks alive.
///
/// Any response below 500 counts as alive; a 404 still proves a server is
/// answering. Connection errors and timeouts count as dead.
pub async fn http_probe(client: &reqwest::Client, url: &str, request_timeout: Duration) -> bool {
    match client.get(url).timeout(request_timeout).send().await {
        Ok(response) => {
            let alive = response.status().as_u16() < 500;
            if alive {
                debug!(url = %url, status = %response.status(), "HTTP probe passed");
            } else {
                debug!(url = %url, status = %response.status(), "HTTP probe failed with server error");
            }
            alive
        },
        Err(e) => {
            debug!(url = %url, error = %e, "HTTP probe failed");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_try_connect_passes_when_port_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(try_connect("127.0.0.1", port, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_try_connect_fails_when_port_closed() {
        // Bind and drop to get a port that is free right now.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!try_connect("127.0.0.1", port, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_try_connect_fails_on_invalid_host() {
        assert!(!try_connect("host.invalid.", 12345, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_try_connect_respects_timeout() {
        // 10.255.255.1 is typically non-routable and will cause a timeout
        let start = std::time::Instant::now();
        let result = try_connect("10.255.255.1", 12345, Duration::from_millis(50)).await;
        let elapsed = start.elapsed();

        assert!(!result);
        assert!(
            elapsed < Duration::from_millis(300),
            "probe should respect timeout (elapsed: {elapsed:?})"
        );
    }

    #[tokio::test]
    async fn test_loopback_reachable_via_ipv4_only_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(loopback_port_reachable(port, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_loopback_unreachable_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!loopback_port_reachable(port, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_tcp_reachable_retries_then_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let start = std::time::Instant::now();
        assert!(!tcp_reachable("127.0.0.1", port, Duration::from_millis(50), 3).await);
        // Refused connections fail fast; three attempts stay well under a
        // second.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_reachable_succeeds_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(tcp_reachable("127.0.0.1", port, Duration::from_millis(200), 2).await);
    }

    #[tokio::test]
    async fn test_http_probe_fails_on_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}/health");
        assert!(!http_probe(&client, &url, Duration::from_millis(200)).await);
    }
}
