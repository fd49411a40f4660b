//! Process tree teardown.
//!
//! Start steps run shell interpreters which fork the real servers, so
//! stopping an application means taking down a whole tree, not one
//! process. Teardown is graceful first (SIGTERM, or plain `taskkill` on
//! Windows), then forceful for whatever survives the grace period.
//! Everything here is best-effort: failures are logged, never returned,
//! and the tracked handle is always reaped before returning.

use std::collections::HashMap;
use std::process::Child;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::constants::STOP_POLL_INTERVAL_MS;

/// Terminates a tracked process and all of its descendants.
///
/// Descendants are snapshotted up front. Both the grace wait and the
/// force phase work from that snapshot, so descendants that outlive or
/// reparent away from the root stay covered through the whole teardown.
pub async fn terminate_tree(child: &mut Child, grace: Duration) {
    let root = child.id();
    let descendants = descendant_pids(root);

    tracing::debug!(
        pid = root,
        descendants = descendants.len(),
        "Terminating process tree"
    );

    request_termination(root, &descendants);

    // Give the tree the grace period to exit on its own. Shell roots
    // usually die ahead of the servers they forked, so the wait tracks
    // the snapshotted descendants as well as the root.
    let deadline = tokio::time::Instant::now() + grace;
    let mut root_exited = false;
    loop {
        if !root_exited {
            match child.try_wait() {
                Ok(Some(_)) => root_exited = true,
                Ok(None) => {},
                Err(e) => {
                    tracing::warn!(pid = root, error = %e, "Failed to poll process");
                    root_exited = true;
                },
            }
        }
        if root_exited && !any_pid_alive(&descendants) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(pid = root, "Process tree survived graceful termination, force killing");
            break;
        }
        tokio::time::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS)).await;
    }

    force_kill_survivors(root, &descendants);

    if !matches!(child.try_wait(), Ok(Some(_))) {
        if let Err(e) = child.kill() {
            tracing::debug!(pid = root, error = %e, "Force kill failed");
        }
    }
    // Always reap so the pid can be recycled.
    if let Err(e) = child.wait() {
        tracing::debug!(pid = root, error = %e, "Failed to reap process");
    }
}

/// PIDs of every process below `root` in the process tree, in no
/// particular order.
fn descendant_pids(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut children_of: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children_of.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(pid) = stack.pop() {
        if let Some(kids) = children_of.get(&pid) {
            for &kid in kids {
                out.push(kid);
                stack.push(kid);
            }
        }
    }
    out
}

/// Whether any of the given PIDs still has a live process behind it.
fn any_pid_alive(pids: &[u32]) -> bool {
    if pids.is_empty() {
        return false;
    }

    let mut system = System::new();
    let targets: Vec<Pid> = pids.iter().map(|p| Pid::from_u32(*p)).collect();
    system.refresh_processes(ProcessesToUpdate::Some(&targets), true);

    pids.iter().any(|p| system.process(Pid::from_u32(*p)).is_some())
}

#[cfg(unix)]
fn request_termination(root: u32, descendants: &[u32]) {
    use nix::sys::signal::Signal;

    for pid in descendants {
        send_signal(*pid, Signal::SIGTERM);
    }
    send_signal(root, Signal::SIGTERM);
}

#[cfg(windows)]
fn request_termination(root: u32, _descendants: &[u32]) {
    // taskkill /T walks the tree itself.
    taskkill(root, false);
}

#[cfg(unix)]
fn force_kill_survivors(_root: u32, descendants: &[u32]) {
    use nix::sys::signal::Signal;

    if descendants.is_empty() {
        return;
    }

    let mut system = System::new();
    let targets: Vec<Pid> = descendants.iter().map(|p| Pid::from_u32(*p)).collect();
    system.refresh_processes(ProcessesToUpdate::Some(&targets), true);

    for pid in descendants {
        if system.process(Pid::from_u32(*pid)).is_some() {
            tracing::warn!(pid = *pid, "Descendant survived graceful termination, sending SIGKILL");
            send_signal(*pid, Signal::SIGKILL);
        }
    }
}

#[cfg(windows)]
fn force_kill_survivors(root: u32, descendants: &[u32]) {
    // taskkill tolerates already-dead targets; reported failures stay at
    // debug level.
    taskkill(root, true);
    for pid in descendants {
        taskkill(*pid, true);
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal;
    use nix::unistd::Pid as NixPid;

    let nix_pid = NixPid::from_raw(pid as i32);
    if let Err(e) = signal::kill(nix_pid, signal) {
        // Usually ESRCH: the process exited between snapshot and signal.
        tracing::debug!(pid = pid, signal = %signal, error = %e, "Signal delivery failed");
    }
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) {
    use std::os::windows::process::CommandExt;
    use std::process::Command;

    let mut args = vec!["/PID".to_string(), pid.to_string(), "/T".to_string()];
    if force {
        args.push("/F".to_string());
    }

    let status = Command::new("taskkill")
        .args(&args)
        .creation_flags(0x0800_0000) // CREATE_NO_WINDOW
        .status();

    match status {
        Ok(status) if status.success() => {},
        Ok(status) => {
            tracing::debug!(pid = pid, force = force, status = %status, "taskkill reported failure");
        },
        Err(e) => {
            tracing::warn!(pid = pid, error = %e, "Failed to run taskkill");
        },
    }
}
