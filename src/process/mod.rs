//! Process spawning and handle tracking.
//!
//! Each start step spawns one detached child process with its output
//! redirected into the owning application's log file. Handles are kept in
//! a [`ProcessSet`] keyed by application id; liveness questions and
//! teardown go through the set. Children are detached into their own
//! process group so a supervisor restart does not take the applications
//! down with it.

pub mod kill;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::shell::ShellInvocation;

/// Tracked child process handles, keyed by application id.
///
/// One application may hold several handles, one per start step. An entry
/// is created empty when a start begins and survives (empty) if every step
/// fails to spawn; liveness checks treat an empty entry like a missing
/// one.
#[derive(Debug, Default)]
pub struct ProcessSet {
    inner: Mutex<HashMap<String, Vec<Child>>>,
}

impl ProcessSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a new tracking generation for an application, discarding
    /// handles from any previous start.
    pub fn begin(&self, id: &str) {
        self.inner.lock().insert(id.to_string(), Vec::new());
    }

    /// Adds a spawned handle to an application's set.
    pub fn track(&self, id: &str, child: Child) {
        self.inner.lock().entry(id.to_string()).or_default().push(child);
    }

    /// True while at least one tracked process is still running.
    pub fn any_alive(&self, id: &str) -> bool {
        let mut map = self.inner.lock();
        match map.get_mut(id) {
            Some(children) => children
                .iter_mut()
                .any(|child| matches!(child.try_wait(), Ok(None))),
            None => false,
        }
    }

    /// True when the application has a non-empty handle set, regardless of
    /// whether the processes still run.
    pub fn is_tracking(&self, id: &str) -> bool {
        self.inner
            .lock()
            .get(id)
            .is_some_and(|children| !children.is_empty())
    }

    /// Drops handles of exited processes and returns how many remain.
    ///
    /// An entry whose processes have all exited is removed entirely; an
    /// entry that was already empty is left in place.
    pub fn reap(&self, id: &str) -> usize {
        let mut map = self.inner.lock();
        let Some(children) = map.get_mut(id) else {
            return 0;
        };
        if children.is_empty() {
            return 0;
        }
        children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        if children.is_empty() {
            map.remove(id);
            return 0;
        }
        children.len()
    }

    /// Removes and returns every handle of an application.
    pub fn take(&self, id: &str) -> Vec<Child> {
        self.inner.lock().remove(id).unwrap_or_default()
    }

    /// Exit code of the most recently tracked process, if it has already
    /// exited.
    pub fn last_spawned_exit(&self, id: &str) -> Option<i32> {
        let mut map = self.inner.lock();
        let children = map.get_mut(id)?;
        let last = children.last_mut()?;
        match last.try_wait() {
            Ok(Some(status)) => Some(exit_code(&status)),
            _ => None,
        }
    }

    /// PIDs of the tracked processes.
    pub fn pids(&self, id: &str) -> Vec<u32> {
        self.inner
            .lock()
            .get(id)
            .map(|children| children.iter().map(Child::id).collect())
            .unwrap_or_default()
    }
}

/// Spawns one start step as a detached background process.
///
/// stdout and stderr both go to `log_file`, stdin is closed. `cwd` is
/// omitted when the command carries its own `cd` prefix instead.
///
/// # Safety
///
/// On Unix this uses `pre_exec` to call `setsid()` which creates a new
/// process group. This is safe because:
/// - `setsid()` is async-signal-safe according to `POSIX`
/// - No memory allocation or locking occurs in the `pre_exec` closure
/// - The closure only calls libc functions that are safe in this context
#[allow(unsafe_code)] // SAFETY: Unix pre_exec/setsid for process group detachment
pub fn spawn_step(
    invocation: &ShellInvocation,
    cwd: Option<&Path>,
    log_file: File,
) -> Result<Child> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(log_file.try_clone().context("Failed to clone log handle")?)
        .stderr(log_file);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use nix::libc;
        use std::os::unix::process::CommandExt;

        unsafe {
            cmd.pre_exec(|| {
                // Create new process group
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;

        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const DETACHED_PROCESS: u32 = 0x0000_0008;

        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
    }

    cmd.spawn()
        .with_context(|| format!("Failed to spawn {}", invocation.program))
}

/// Conventional exit code for an exit status: the real code when the
/// process exited, the negated signal number when a signal killed it.
#[must_use]
pub fn exit_code(status: &ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(unix)]
    fn spawn_sleep(secs: u32) -> Child {
        Command::new("sleep")
            .arg(secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_untracked_id_has_no_processes() {
        let set = ProcessSet::new();
        assert!(!set.any_alive("ghost"));
        assert!(!set.is_tracking("ghost"));
        assert_eq!(set.reap("ghost"), 0);
        assert!(set.take("ghost").is_empty());
        assert!(set.pids("ghost").is_empty());
    }

    #[test]
    fn test_begin_creates_empty_generation() {
        let set = ProcessSet::new();
        set.begin("web");
        // An empty entry counts as not tracking.
        assert!(!set.is_tracking("web"));
        assert!(!set.any_alive("web"));
    }

    #[cfg(unix)]
    #[test]
    fn test_track_and_liveness() {
        let set = ProcessSet::new();
        set.begin("web");
        set.track("web", spawn_sleep(30));

        assert!(set.is_tracking("web"));
        assert!(set.any_alive("web"));
        assert_eq!(set.pids("web").len(), 1);

        for mut child in set.take("web") {
            child.kill().unwrap();
            child.wait().unwrap();
        }
        assert!(!set.is_tracking("web"));
    }

    #[cfg(unix)]
    #[test]
    fn test_begin_discards_previous_generation() {
        let set = ProcessSet::new();
        let mut old = spawn_sleep(30);
        let old_pid = old.id();
        old.kill().unwrap();
        old.wait().unwrap();
        set.track("web", old);

        set.begin("web");
        assert!(set.pids("web").is_empty());
        assert!(!set.pids("web").contains(&old_pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_drops_exited_and_removes_entry() {
        let set = ProcessSet::new();
        let mut child = spawn_sleep(30);
        child.kill().unwrap();
        child.wait().unwrap();
        set.track("web", child);

        assert_eq!(set.reap("web"), 0);
        // All processes were gone, so the entry itself is removed.
        assert!(set.take("web").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_keeps_survivors() {
        let set = ProcessSet::new();
        let mut dead = spawn_sleep(30);
        dead.kill().unwrap();
        dead.wait().unwrap();
        set.track("web", dead);
        set.track("web", spawn_sleep(30));

        assert_eq!(set.reap("web"), 1);
        assert!(set.any_alive("web"));

        for mut child in set.take("web") {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_last_spawned_exit_reports_code() {
        let set = ProcessSet::new();
        let child = Command::new("sh")
            .args(["-c", "exit 3"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        set.track("web", child);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(set.last_spawned_exit("web"), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_last_spawned_exit_none_while_running() {
        let set = ProcessSet::new();
        set.track("web", spawn_sleep(30));
        assert_eq!(set.last_spawned_exit("web"), None);

        for mut child in set.take("web") {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_for_signal_death() {
        let mut child = spawn_sleep(30);
        child.kill().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(exit_code(&status), -9);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_for_normal_exit() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 7"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let status = child.wait().unwrap();
        assert_eq!(exit_code(&status), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_step_redirects_output() {
        use crate::host::HostOs;
        use crate::shell::build_invocation;
        use crate::spec::ShellKind;

        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("web.log");
        let log_file = File::create(&log_path).unwrap();

        let invocation =
            build_invocation(ShellKind::Bash, "echo hello from step", None, HostOs::detect());
        let mut child = spawn_step(&invocation, Some(dir.path()), log_file).unwrap();
        child.wait().unwrap();

        let output = std::fs::read_to_string(&log_path).unwrap();
        assert!(output.contains("hello from step"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_step_missing_program_errors() {
        let invocation = ShellInvocation {
            program: "definitely-not-a-real-binary-xyz".to_string(),
            args: vec![],
        };
        let dir = tempfile::TempDir::new().unwrap();
        let log_file = File::create(dir.path().join("x.log")).unwrap();

        let result = spawn_step(&invocation, None, log_file);
        assert!(result.is_err());
        assert!(
            format!("{:#}", result.unwrap_err()).contains("definitely-not-a-real-binary-xyz")
        );
    }
}
