//! Host environment detection and cross-environment queries.
//!
//! The supervisor can run on plain Linux, inside a WSL distro, or on the
//! Windows host that owns such distros. A few operations only make sense
//! in the last case: asking a distro for its internal address and asking
//! Windows which process is listening on a local port. Those cross the
//! environment boundary through external tools (`wsl.exe`, `netstat`) and
//! are abstracted behind [`OsBridge`] so the URL resolution logic can be
//! exercised without a Windows host.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::constants::BRIDGE_QUERY_TIMEOUT_SECS;

// =====
// Host detection
// =====

/// Kind of environment the supervisor itself runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Native Windows.
    Windows,
    /// Linux kernel provided by WSL.
    Wsl,
    /// Plain Linux.
    Linux,
    /// Anything else (macOS and friends); treated like Linux for shell
    /// selection.
    Other,
}

impl HostOs {
    /// Detect the current environment.
    ///
    /// WSL is recognized by the `microsoft` marker the WSL kernel puts in
    /// `/proc/version`.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            return Self::Windows;
        }
        if cfg!(target_os = "linux") {
            if let Ok(version) = std::fs::read_to_string("/proc/version") {
                if version.to_lowercase().contains("microsoft") {
                    return Self::Wsl;
                }
            }
            return Self::Linux;
        }
        Self::Other
    }

    /// True on native Windows.
    #[must_use]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }
}

// =====
// Cross-environment queries
// =====

/// Queries that cross the Windows/WSL boundary.
///
/// The production implementation shells out to Windows tools; tests swap
/// in a scripted implementation.
#[async_trait]
pub trait OsBridge: Send + Sync {
    /// Internal IPv4 address of a running distro, or `None` when the
    /// distro is unknown, stopped, or the query host is not Windows.
    async fn distro_ip(&self, distro: &str) -> Option<String>;

    /// Name of the Windows process listening on `127.0.0.1:port`, if any.
    async fn listener_process(&self, port: u16) -> Option<String>;
}

/// [`OsBridge`] backed by `wsl.exe` and `netstat`.
///
/// Both queries return `None` immediately when the current host is not
/// Windows, so the bridge is safe to wire up unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBridge;

#[async_trait]
impl OsBridge for NativeBridge {
    async fn distro_ip(&self, distro: &str) -> Option<String> {
        if !HostOs::detect().is_windows() {
            return None;
        }

        let mut cmd = Command::new("wsl.exe");
        cmd.args(["-d", distro, "hostname", "-I"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000); // CREATE_NO_WINDOW

        let output = tokio::time::timeout(
            Duration::from_secs(BRIDGE_QUERY_TIMEOUT_SECS),
            cmd.output(),
        )
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                stdout.split_whitespace().next().map(ToString::to_string)
            },
            Ok(Ok(out)) => {
                tracing::debug!(distro = %distro, status = %out.status, "Distro address query failed");
                None
            },
            Ok(Err(e)) => {
                tracing::debug!(distro = %distro, error = %e, "Failed to run wsl.exe");
                None
            },
            Err(_) => {
                tracing::debug!(distro = %distro, "Distro address query timed out");
                None
            },
        }
    }

    async fn listener_process(&self, port: u16) -> Option<String> {
        if !HostOs::detect().is_windows() {
            return None;
        }

        let mut cmd = Command::new("netstat");
        cmd.args(["-ano", "-p", "TCP"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000); // CREATE_NO_WINDOW

        let output = tokio::time::timeout(
            Duration::from_secs(BRIDGE_QUERY_TIMEOUT_SECS),
            cmd.output(),
        )
        .await;

        let out = match output {
            Ok(Ok(out)) if out.status.success() => out,
            _ => return None,
        };

        let text = String::from_utf8_lossy(&out.stdout);
        let pid = parse_listener_pid(&text, port)?;
        process_name(pid)
    }
}

/// Extracts the owning PID of the TCP listener on `port` from `netstat
/// -ano -p TCP` output.
fn parse_listener_pid(netstat_output: &str, port: u16) -> Option<u32> {
    for line in netstat_output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || fields[0] != "TCP" || !fields[3].eq_ignore_ascii_case("LISTENING") {
            continue;
        }
        // Local address may be IPv4 or bracketed IPv6; the port always
        // follows the last colon.
        let local = fields[1];
        let Some(idx) = local.rfind(':') else {
            continue;
        };
        if local[idx + 1..].parse::<u16>() != Ok(port) {
            continue;
        }
        if let Ok(pid) = fields[4].parse::<u32>() {
            return Some(pid);
        }
    }
    None
}

/// Executable name of a process, if it is still running.
fn process_name(pid: u32) -> Option<String> {
    let mut system = sysinfo::System::new();
    let target = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[target]), true);
    system
        .process(target)
        .map(|p| p.name().to_string_lossy().into_owned())
}

/// True when a listener name belongs to WSL's own port-forwarding
/// machinery rather than an unrelated Windows service.
#[must_use]
pub fn is_wsl_bridge_process(name: &str) -> bool {
    let n = name.to_lowercase();
    matches!(
        n.as_str(),
        "wslhost.exe" | "wsl.exe" | "wslservice.exe" | "vmmem" | "system"
    ) || n.starts_with("wsl")
}
