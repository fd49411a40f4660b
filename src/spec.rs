//! Application specification data model.
//!
//! An [`AppSpec`] is the immutable description of one supervised
//! application, supplied by the surrounding configuration layer. The
//! supervisor never persists these; it consumes whatever list it is
//! handed on each call.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::DEFAULT_HEALTH_WAIT_SECS;

/// Shell used to run a start step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// Bash. On a Windows host this routes through WSL.
    #[default]
    Bash,
    /// PowerShell (`powershell.exe` on Windows, `pwsh` elsewhere).
    Powershell,
    /// `cmd.exe` on Windows; falls back to bash elsewhere.
    Cmd,
}

/// One start step: a command line run through a shell, optionally in a
/// working directory of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartStep {
    /// Command text. The `{workspace}` placeholder is substituted with the
    /// resolved workspace path before execution.
    pub cmd: String,
    /// Shell to run the command with.
    #[serde(default)]
    pub shell: ShellKind,
    /// Working directory override. Defaults to the workspace; supports the
    /// `{workspace}` placeholder.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl StartStep {
    /// Create a bash start step.
    pub fn bash(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            shell: ShellKind::Bash,
            cwd: None,
        }
    }
}

/// A single HTTP health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {
    /// URL to GET. Any response status below 500 counts as passing.
    pub url: String,
    /// Upper bound on how long to wait for this probe to start passing.
    /// The longest timeout across all probes becomes the start wait budget.
    #[serde(default = "default_probe_timeout")]
    pub timeout_sec: u64,
}

fn default_probe_timeout() -> u64 {
    DEFAULT_HEALTH_WAIT_SECS
}

impl HealthProbe {
    /// Create a probe with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_sec: DEFAULT_HEALTH_WAIT_SECS,
        }
    }
}

/// Immutable definition of one supervised application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Unique key. Also names the application's log file.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Workspace path. May be host-native (`C:\...`), a WSL UNC path
    /// (`\\wsl.localhost\<distro>\...`), or a plain absolute path.
    pub workspace: String,
    /// Ordered start steps, executed sequentially and fail-fast.
    #[serde(default)]
    pub start: Vec<StartStep>,
    /// HTTP health probes.
    #[serde(default)]
    pub health: Vec<HealthProbe>,
    /// Ports that must accept loopback TCP connections for the
    /// application to count as healthy.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// URLs presented to the user once the application is running.
    #[serde(default)]
    pub open: Vec<String>,
}

impl AppSpec {
    /// Create a specification with no start steps, probes, ports, or URLs.
    pub fn new(id: impl Into<String>, name: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workspace: workspace.into(),
            start: Vec::new(),
            health: Vec::new(),
            ports: Vec::new(),
            open: Vec::new(),
        }
    }

    /// Add a start step.
    #[must_use]
    pub fn with_step(mut self, step: StartStep) -> Self {
        self.start.push(step);
        self
    }

    /// Add a health probe.
    #[must_use]
    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.health.push(probe);
        self
    }

    /// Add a declared port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Add a URL to open on success.
    #[must_use]
    pub fn with_open_url(mut self, url: impl Into<String>) -> Self {
        self.open.push(url.into());
        self
    }

    /// Whether any HTTP probes are declared.
    pub fn has_http_probes(&self) -> bool {
        !self.health.is_empty()
    }

    /// Whether any port checks are declared.
    pub fn has_port_checks(&self) -> bool {
        !self.ports.is_empty()
    }

    /// How long to wait for this application to become healthy after a
    /// start: the longest declared probe timeout, or the default wait
    /// when no probes are declared.
    pub fn max_health_wait(&self) -> Duration {
        let secs = self
            .health
            .iter()
            .map(|probe| probe.timeout_sec)
            .max()
            .unwrap_or(DEFAULT_HEALTH_WAIT_SECS);
        Duration::from_secs(secs)
    }
}
