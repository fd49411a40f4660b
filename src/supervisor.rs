//! Lifecycle coordination for supervised applications.
//!
//! The [`Supervisor`] owns the state store and process handle set and
//! drives every transition through them: start steps, the post-start
//! health wait, explicit stops, and the periodic reconciliation pass.
//! Operations never panic past this boundary; failures come back as
//! [`SupervisorError`] values or as structured [`LaunchOutcome`]s whose
//! message matches the state record exactly.
//!
//! Concurrent workflows for the same application (an explicit `launch`,
//! a `refresh` tick, a background poll left over from `start`) are all
//! valid; the store applies last-observation-wins semantics and `stop`
//! always forces the status to `Stopped` regardless of what an in-flight
//! poll later concludes.

use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::applog::AppLog;
use crate::config::SupervisorConfig;
use crate::constants::{DEFAULT_LOG_TAIL_LINES, SPAWN_GRACE_MS};
use crate::error::{Result, SupervisorError};
use crate::health::HealthEvaluator;
use crate::host::{HostOs, NativeBridge, OsBridge};
use crate::net::resolve::UrlResolver;
use crate::paths::{expand_workspace, to_linux_path};
use crate::process::kill::terminate_tree;
use crate::process::{ProcessSet, spawn_step};
use crate::shell::build_invocation;
use crate::spec::{AppSpec, ShellKind, StartStep};
use crate::state::{AppState, AppStatus, StateStore};

// =====
// Launch outcome
// =====

/// Overall verdict of a [`Supervisor::launch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    /// The application is running (or already was).
    Success,
    /// A start step failed or the health wait timed out.
    Error,
}

/// Structured result of a [`Supervisor::launch`] call.
///
/// The message always equals the application's state message at the time
/// the call returned, so callers can show either interchangeably.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutcome {
    /// Success or error.
    pub status: LaunchStatus,
    /// Human-readable detail.
    pub message: String,
    /// Resolved URLs to present to the user; empty on error.
    pub open_urls: Vec<String>,
}

impl LaunchOutcome {
    fn success(message: impl Into<String>, open_urls: Vec<String>) -> Self {
        Self {
            status: LaunchStatus::Success,
            message: message.into(),
            open_urls,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: LaunchStatus::Error,
            message: message.into(),
            open_urls: Vec::new(),
        }
    }

    /// Whether the launch ended with the application running.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LaunchStatus::Success
    }
}

// =====
// Supervisor
// =====

/// Coordinates application lifecycles: spawning, health settling,
/// teardown, and reconciliation.
///
/// Cheap to clone; clones share the same store, process set, and log
/// handle, so one supervisor can serve several callers at once.
#[derive(Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    store: StateStore,
    processes: Arc<ProcessSet>,
    health: HealthEvaluator,
    resolver: UrlResolver,
    applog: AppLog,
    /// Background post-start polls. Retained so cancellation could be added
    /// later; `stop` deliberately does not cancel them.
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Supervisor {
    /// Supervisor using the real OS bridge for WSL queries.
    pub fn new(config: SupervisorConfig) -> anyhow::Result<Self> {
        Self::with_bridge(config, Arc::new(NativeBridge))
    }

    /// Supervisor with an explicit OS bridge, for tests and embedding.
    pub fn with_bridge(config: SupervisorConfig, bridge: Arc<dyn OsBridge>) -> anyhow::Result<Self> {
        let applog = AppLog::new(config.log_dir()?, config.rotation());
        let processes = Arc::new(ProcessSet::new());
        let health = HealthEvaluator::new(
            Arc::clone(&processes),
            config.check_timeout(),
            config.poll_interval(),
        );
        let resolver = UrlResolver::new(bridge);

        Ok(Self {
            config,
            store: StateStore::new(),
            processes,
            health,
            resolver,
            applog,
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    // =====
    // State access
    // =====

    /// Snapshot of one application's state, if the identifier is known.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<AppState> {
        self.store.get(id)
    }

    /// Snapshot of every known application state, ordered by identifier.
    #[must_use]
    pub fn all_states(&self) -> Vec<AppState> {
        self.store.all()
    }

    /// Drop the state record for a deleted application. Any live processes
    /// should be stopped first; this only forgets the record.
    pub fn remove_state(&self, id: &str) -> bool {
        self.store.remove(id)
    }

    /// Path of the application's log file.
    #[must_use]
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.applog.path(id)
    }

    /// Last `max_lines` lines of the application's log, or a placeholder
    /// string when no log exists. `None` reads the default tail of
    /// [`DEFAULT_LOG_TAIL_LINES`] lines. Never fails.
    #[must_use]
    pub fn read_log(&self, id: &str, max_lines: Option<usize>) -> String {
        self.applog
            .tail(id, max_lines.unwrap_or(DEFAULT_LOG_TAIL_LINES))
    }

    // =====
    // Start
    // =====

    /// Runs every start step in order, fail-fast.
    ///
    /// On success the application is left in `Starting` with a background
    /// poll scheduled to settle it to `Running` or `Error`. On failure the
    /// state is `Error` and the returned error's text equals the state
    /// message.
    pub async fn start(&self, spec: &AppSpec) -> Result<()> {
        self.store.ensure(spec);
        self.store
            .set_status(&spec.id, AppStatus::Starting, "Starting application...");
        self.applog
            .append(&spec.id, &format!("=== Starting {} ===", spec.name));

        match self.run_start_steps(spec).await {
            Ok(()) => {
                self.spawn_post_start_poll(spec.clone());
                Ok(())
            },
            Err(e) => {
                let message = e.to_string();
                self.store.set_status(&spec.id, AppStatus::Error, &message);
                self.applog.append(&spec.id, &format!("ERROR: {message}"));
                tracing::error!(app = %spec.id, error = %message, "Start failed");
                Err(e)
            },
        }
    }

    async fn run_start_steps(&self, spec: &AppSpec) -> Result<()> {
        let workspace = expand_workspace(&spec.workspace);
        if !workspace.exists() {
            return Err(SupervisorError::workspace_not_found(
                workspace.display().to_string(),
            ));
        }

        let host = HostOs::detect();
        self.processes.begin(&spec.id);

        for step in &spec.start {
            self.run_step(spec, step, &workspace, host).await?;
        }
        Ok(())
    }

    /// Spawns one start step and verifies it survives the grace period.
    async fn run_step(
        &self,
        spec: &AppSpec,
        step: &StartStep,
        workspace: &Path,
        host: HostOs,
    ) -> Result<()> {
        let workspace_str = workspace.display().to_string();
        let cwd_raw = step.cwd.as_deref().unwrap_or("{workspace}");
        let cwd = expand_workspace(&cwd_raw.replace("{workspace}", &workspace_str));
        let cwd_str = cwd.display().to_string();

        // Bash steps on a Windows host execute inside the default WSL
        // distro, where host-side paths are meaningless. The command gets
        // Linux-form paths and carries its own cd prefix; the spawned
        // wsl.exe itself gets no working directory.
        let wsl_routed = step.shell == ShellKind::Bash && host.is_windows();
        let cwd_for_command = if wsl_routed {
            to_linux_path(&cwd_str)
        } else {
            cwd_str.clone()
        };
        let workspace_for_command = if wsl_routed {
            to_linux_path(&workspace_str)
        } else {
            workspace_str
        };

        let command = step.cmd.replace("{workspace}", &workspace_for_command);
        let invocation = build_invocation(step.shell, &command, Some(&cwd_for_command), host);

        self.applog
            .append(&spec.id, &format!("Executing: {invocation}"));
        self.applog.append(
            &spec.id,
            &format!("Working directory: {cwd_str} (command uses: {cwd_for_command})"),
        );

        let log_file = self
            .applog
            .open_for_output(&spec.id)
            .map_err(|e| SupervisorError::spawn_failed(format!("{e:#}")))?;

        let process_cwd = if wsl_routed { None } else { Some(cwd.as_path()) };
        let child = spawn_step(&invocation, process_cwd, log_file)
            .map_err(|e| SupervisorError::spawn_failed(format!("{e:#}")))?;

        let pid = child.id();
        self.processes.track(&spec.id, child);
        self.applog
            .append(&spec.id, &format!("Process started with PID: {pid}"));
        tracing::info!(app = %spec.id, pid, "Started process");

        // Catch commands that die right away (missing script, syntax
        // error) so later steps never run against a broken prerequisite.
        tokio::time::sleep(Duration::from_millis(SPAWN_GRACE_MS)).await;
        if let Some(code) = self.processes.last_spawned_exit(&spec.id) {
            return Err(SupervisorError::exited_immediately(code));
        }
        Ok(())
    }

    /// Schedules the background health wait that settles a raw `start` to
    /// `Running` or `Error` even when nobody polls synchronously.
    fn spawn_post_start_poll(&self, spec: AppSpec) {
        let supervisor = self.clone();
        let handle = tokio::spawn(async move {
            let max_wait = spec.max_health_wait();
            if supervisor.health.wait_until_healthy(&spec, max_wait).await {
                supervisor
                    .store
                    .set_status(&spec.id, AppStatus::Running, "Application is running");
                supervisor
                    .applog
                    .append(&spec.id, "Health check passed - application is running");
            } else {
                let message = SupervisorError::health_timeout(max_wait.as_secs()).to_string();
                supervisor
                    .store
                    .set_status(&spec.id, AppStatus::Error, &message);
                supervisor.applog.append(&spec.id, &format!("ERROR: {message}"));
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    // =====
    // Launch
    // =====

    /// Composite start: quick health check, start steps, synchronous
    /// health wait, URL resolution.
    ///
    /// Never returns an error; failures come back as an error outcome
    /// whose message matches the state record.
    pub async fn launch(&self, spec: &AppSpec) -> LaunchOutcome {
        self.store.ensure(spec);

        // Already healthy? Nothing to spawn.
        if self
            .health
            .check(spec, self.config.quick_check_timeout())
            .await
        {
            self.store.set_status(
                &spec.id,
                AppStatus::Running,
                "Application is already running",
            );
            let urls = self.resolve_open_urls(spec).await;
            return LaunchOutcome::success("Application is already running", urls);
        }

        if self.start(spec).await.is_err() {
            let message = self
                .store
                .get(&spec.id)
                .and_then(|state| state.message)
                .unwrap_or_else(|| "Failed to start application".to_string());
            return LaunchOutcome::error(message);
        }

        let max_wait = spec.max_health_wait();
        if self.health.wait_until_healthy(spec, max_wait).await {
            self.store.set_status(
                &spec.id,
                AppStatus::Running,
                "Application started successfully",
            );
            let urls = self.resolve_open_urls(spec).await;
            LaunchOutcome::success("Application started successfully", urls)
        } else {
            let message = SupervisorError::health_timeout(max_wait.as_secs()).to_string();
            self.store.set_status(&spec.id, AppStatus::Error, &message);
            LaunchOutcome::error(message)
        }
    }

    // =====
    // Stop
    // =====

    /// Terminates every tracked process tree and forces the status to
    /// `Stopped`. Idempotent; unknown identifiers succeed trivially.
    pub async fn stop(&self, id: &str) -> bool {
        let handles = self.processes.take(id);
        let had_processes = !handles.is_empty();

        for mut child in handles {
            terminate_tree(&mut child, self.config.stop_grace()).await;
        }

        // Cleanup above is best-effort; the status flips regardless, and
        // any in-flight poll's later verdict is simply superseded.
        let had_state = self.store.set_status(id, AppStatus::Stopped, "Application stopped");

        if had_state || had_processes {
            self.applog.append(id, "Application stopped");
            tracing::info!(app = %id, "Stopped application");
        }
        true
    }

    // =====
    // Reconciliation
    // =====

    /// Re-evaluates every specification's actual state: reaps exited
    /// handles, then settles the status from health and liveness.
    ///
    /// An application in `Starting` with probes configured is skipped so
    /// the in-flight start wait keeps ownership of its status.
    pub async fn refresh(&self, specs: &[AppSpec]) {
        for spec in specs {
            self.store.ensure(spec);
            self.processes.reap(&spec.id);

            let starting = self
                .store
                .get(&spec.id)
                .is_some_and(|state| state.status == AppStatus::Starting);
            if starting && (spec.has_http_probes() || spec.has_port_checks()) {
                continue;
            }

            if self
                .health
                .check(spec, self.config.quick_check_timeout())
                .await
            {
                self.store
                    .set_status(&spec.id, AppStatus::Running, "Application is running");
            } else if self.processes.is_tracking(&spec.id) {
                self.store
                    .set_status(&spec.id, AppStatus::Starting, "Starting...");
            } else {
                self.store
                    .set_status(&spec.id, AppStatus::Stopped, "Application is stopped");
            }
        }
    }

    // =====
    // URL resolution
    // =====

    /// Resolves which URLs the user should actually open for this
    /// application, rewriting or suppressing loopback URLs when the
    /// workspace lives inside a WSL distro.
    pub async fn resolve_open_urls(&self, spec: &AppSpec) -> Vec<String> {
        self.resolver.resolve_open_urls(spec, &self.applog).await
    }
}
