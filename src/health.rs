//! Application health evaluation.
//!
//! An application is healthy when its declared signals agree it is: every
//! declared port must accept loopback TCP connections, and at least one
//! declared HTTP probe must answer without a server error. An application
//! that declares neither falls back to raw process liveness. Checks are
//! point-in-time; [`HealthEvaluator::wait_until_healthy`] layers a polling
//! loop on top for startup.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::PORT_CONNECT_TIMEOUT_MS;
use crate::net::probe::{http_probe, loopback_port_reachable};
use crate::process::ProcessSet;
use crate::spec::AppSpec;

/// Evaluates health checks against one shared HTTP client.
#[derive(Clone)]
pub struct HealthEvaluator {
    client: reqwest::Client,
    processes: Arc<ProcessSet>,
    check_timeout: Duration,
    poll_interval: Duration,
}

impl HealthEvaluator {
    /// Evaluator over the given process set.
    ///
    /// `check_timeout` bounds each HTTP request during the startup wait;
    /// `poll_interval` spaces the wait's attempts.
    pub fn new(processes: Arc<ProcessSet>, check_timeout: Duration, poll_interval: Duration) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .build()
            .expect("failed to create HTTP client - check TLS configuration");

        Self {
            client,
            processes,
            check_timeout,
            poll_interval,
        }
    }

    /// One point-in-time health check.
    ///
    /// HTTP probes pass as a group when any single probe answers below
    /// 500; ports must all accept. With both kinds declared, both groups
    /// must pass. With neither, any tracked process still running counts
    /// as healthy.
    pub async fn check(&self, spec: &AppSpec, http_timeout: Duration) -> bool {
        let has_http = spec.has_http_probes();
        let has_ports = spec.has_port_checks();

        if !has_http && !has_ports {
            return self.processes.any_alive(&spec.id);
        }

        let mut http_ok = true;
        if has_http {
            http_ok = false;
            for probe in &spec.health {
                if http_probe(&self.client, &probe.url, http_timeout).await {
                    http_ok = true;
                    break;
                }
            }
        }

        let mut ports_ok = true;
        if has_ports {
            for port in &spec.ports {
                if !loopback_port_reachable(*port, Duration::from_millis(PORT_CONNECT_TIMEOUT_MS))
                    .await
                {
                    ports_ok = false;
                    break;
                }
            }
        }

        http_ok && ports_ok
    }

    /// Polls [`check`](Self::check) until it passes or `max_wait` elapses.
    pub async fn wait_until_healthy(&self, spec: &AppSpec, max_wait: Duration) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < max_wait {
            if self.check(spec, self.check_timeout).await {
                return true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        false
    }
}
