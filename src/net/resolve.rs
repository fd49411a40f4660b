//! Loopback URL resolution across the Windows/WSL boundary.
//!
//! Applications declare the URLs a user should open once the app is up,
//! typically `http://localhost:<port>`. When the app actually runs inside
//! a WSL distro and the supervisor runs on the Windows host, localhost
//! forwarding may be missing or, worse, an unrelated Windows process may
//! own the same loopback port. This resolver rewrites loopback URLs to
//! the distro's internal address when that address answers, and suppresses
//! URLs that would open somebody else's service.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::applog::AppLog;
use crate::constants::{
    RESOLVE_PROBE_ATTEMPTS, RESOLVE_PROBE_TIMEOUT_SECS, WSL_IP_CACHE_TTL_SECS,
};
use crate::host::{OsBridge, is_wsl_bridge_process};
use crate::net::probe::tcp_reachable;
use crate::paths::WorkspaceForm;
use crate::spec::AppSpec;

/// Cached distro address with its query time.
#[derive(Debug, Clone)]
struct CachedIp {
    ip: String,
    at: Instant,
}

/// Outcome of resolving one declared URL.
enum Resolution {
    /// Pass the URL through untouched.
    Keep,
    /// Replace it with a rewritten URL.
    Rewrite(String),
    /// Drop it; an unrelated host process owns the port.
    Suppress { listener: String, port: u16 },
}

/// Rewrites or filters an application's declared open URLs.
///
/// Distro addresses are cached per distro with a short TTL because state
/// refreshes run frequently and each query shells out to `wsl.exe`.
#[derive(Clone)]
pub struct UrlResolver {
    bridge: Arc<dyn OsBridge>,
    cache: Arc<Mutex<HashMap<String, CachedIp>>>,
    ttl: Duration,
}

impl UrlResolver {
    /// Resolver with the default cache TTL.
    pub fn new(bridge: Arc<dyn OsBridge>) -> Self {
        Self::with_ttl(bridge, Duration::from_secs(WSL_IP_CACHE_TTL_SECS))
    }

    /// Resolver with an explicit cache TTL.
    pub fn with_ttl(bridge: Arc<dyn OsBridge>, ttl: Duration) -> Self {
        Self {
            bridge,
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Distro address, served from cache while fresh. Failed queries are
    /// not cached so the next resolve retries.
    async fn distro_ip(&self, distro: &str) -> Option<String> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(distro) {
                if entry.at.elapsed() < self.ttl {
                    return Some(entry.ip.clone());
                }
            }
        }

        let ip = self.bridge.distro_ip(distro).await?;
        self.cache.lock().insert(
            distro.to_string(),
            CachedIp {
                ip: ip.clone(),
                at: Instant::now(),
            },
        );
        Some(ip)
    }

    /// Returns the URLs to open for an application.
    ///
    /// For workspaces that do not point into a distro, or when the distro
    /// address cannot be determined, the declared URLs pass through
    /// verbatim. Suppressed URLs leave a WARN line in the application log
    /// explaining which process shadowed the port.
    pub async fn resolve_open_urls(&self, spec: &AppSpec, log: &AppLog) -> Vec<String> {
        let urls = spec.open.clone();

        let form = WorkspaceForm::parse(&spec.workspace);
        let Some(distro) = form.distro() else {
            return urls;
        };
        let Some(ip) = self.distro_ip(distro).await else {
            return urls;
        };

        let mut resolved = Vec::with_capacity(urls.len());
        for url in &urls {
            match self.resolve_one(url, &ip).await {
                Resolution::Keep => resolved.push(url.clone()),
                Resolution::Rewrite(rewritten) => {
                    tracing::debug!(app = %spec.id, from = %url, to = %rewritten, "Rewrote loopback URL to distro address");
                    resolved.push(rewritten);
                },
                Resolution::Suppress { listener, port } => {
                    let message = format!(
                        "WARN: Not opening {url} because {listener} is listening on localhost:{port} and WSL IP {ip}:{port} is not reachable."
                    );
                    log.append(&spec.id, &message);
                    tracing::warn!(
                        app = %spec.id,
                        url = %url,
                        listener = %listener,
                        port = port,
                        "Suppressing loopback URL shadowed by a host process"
                    );
                },
            }
        }
        resolved
    }

    async fn resolve_one(&self, url: &str, ip: &str) -> Resolution {
        let Ok(mut parsed) = Url::parse(url) else {
            return Resolution::Keep;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Resolution::Keep;
        }
        let loopback_host = matches!(
            parsed.host_str().map(str::to_ascii_lowercase).as_deref(),
            Some("127.0.0.1" | "localhost")
        );
        if !loopback_host {
            return Resolution::Keep;
        }
        // Only URLs with an explicit non-default port take part; there is
        // nothing to probe otherwise.
        let Some(port) = parsed.port() else {
            return Resolution::Keep;
        };

        if tcp_reachable(
            ip,
            port,
            Duration::from_secs(RESOLVE_PROBE_TIMEOUT_SECS),
            RESOLVE_PROBE_ATTEMPTS,
        )
        .await
        {
            // set_host keeps port, userinfo, path, query and fragment.
            if parsed.set_host(Some(ip)).is_ok() {
                return Resolution::Rewrite(parsed.to_string());
            }
            return Resolution::Keep;
        }

        match self.bridge.listener_process(port).await {
            Some(listener) if !is_wsl_bridge_process(&listener) => {
                Resolution::Suppress { listener, port }
            },
            _ => Resolution::Keep,
        }
    }
}
