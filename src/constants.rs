//! Centralized timing and sizing constants.
//!
//! All magic numbers used by the supervisor should be defined here with
//! documented rationale. This enables:
//! - Tuning in one place
//! - Consistent timeouts across modules
//! - Easy auditing without code search

// =============================================================================
// Process Supervision
// =============================================================================

/// Grace period after spawning a start step before polling for immediate exit
/// (200 ms). Long enough to catch misconfigured scripts that die instantly,
/// short enough not to slow down multi-step starts.
pub const SPAWN_GRACE_MS: u64 = 200;

/// How long `stop` waits for a process tree to exit after graceful
/// termination before force-killing survivors (5 seconds).
pub const STOP_GRACE_SECS: u64 = 5;

/// Polling interval while waiting for a terminated process to exit (100 ms).
pub const STOP_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// Health Checks
// =============================================================================

/// Spacing between health-check attempts in the wait loop (2 seconds).
pub const HEALTH_POLL_INTERVAL_SECS: u64 = 2;

/// Per-request timeout for health probes issued from the wait loop
/// (5 seconds).
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Per-request timeout for quick health checks (3 seconds). Used by the
/// launch short-circuit and by periodic reconciliation, where a slow probe
/// must not stall the caller.
pub const QUICK_CHECK_TIMEOUT_SECS: u64 = 3;

/// Maximum time to wait for an application to become healthy when its
/// specification declares no probe timeouts (120 seconds).
pub const DEFAULT_HEALTH_WAIT_SECS: u64 = 120;

/// Connect timeout per loopback family when checking a declared port
/// (500 ms). Ports are checked on both IPv4 and IPv6 loopback; either
/// succeeding counts.
pub const PORT_CONNECT_TIMEOUT_MS: u64 = 500;

// =============================================================================
// Cross-Environment URL Resolution
// =============================================================================

/// Time-to-live for cached WSL distribution IPs (30 seconds).
/// Reconciliation runs frequently; the cache bounds how often `wsl.exe`
/// is invoked. Reachability is always re-verified before an IP is used.
pub const WSL_IP_CACHE_TTL_SECS: u64 = 30;

/// Timeout for a single bridge query (`wsl.exe -d <distro> hostname -I`)
/// or host listener-table read (2 seconds).
pub const BRIDGE_QUERY_TIMEOUT_SECS: u64 = 2;

/// Connect timeout per attempt when probing `distro_ip:port` reachability
/// (1 second).
pub const RESOLVE_PROBE_TIMEOUT_SECS: u64 = 1;

/// Number of connect attempts when probing `distro_ip:port`. Two attempts
/// tolerate transient refusal on busy machines.
pub const RESOLVE_PROBE_ATTEMPTS: u32 = 2;

// =============================================================================
// Log Files
// =============================================================================

/// Directory under the home directory holding supervisor data.
pub const DATA_DIR_NAME: &str = ".appdock";

/// Subdirectory of the data directory holding per-application logs.
pub const LOG_DIR_NAME: &str = "logs";

/// Timestamp prefix format for supervisor-written log lines (local time).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default number of lines returned when reading an application log.
pub const DEFAULT_LOG_TAIL_LINES: usize = 2000;

/// Default maximum log file size before rotation (10 MB).
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of rotated log files kept per application.
pub const DEFAULT_LOG_MAX_FILES: usize = 5;
