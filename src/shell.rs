//! Shell command construction.
//!
//! Start steps are free-form shell strings; this module maps a step's
//! declared shell onto the concrete interpreter invocation for the host.
//! On Windows, `bash` steps are routed through `wsl`, in which case the
//! working directory cannot be passed to the spawned process directly and
//! is instead folded into the command line as a `cd` prefix.

use std::fmt;

use crate::host::HostOs;
use crate::spec::ShellKind;

/// Fully resolved interpreter invocation for one start step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    /// Interpreter executable.
    pub program: String,
    /// Arguments, with the command string as the final element.
    pub args: Vec<String>,
}

impl fmt::Display for ShellInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Builds the interpreter invocation for `command` under `kind` on `host`.
///
/// `cwd` is only consulted for `bash` steps on a Windows host, where the
/// command runs inside the default distro and inherits no useful working
/// directory; for every other combination the caller sets the working
/// directory on the spawned process itself.
#[must_use]
pub fn build_invocation(
    kind: ShellKind,
    command: &str,
    cwd: Option<&str>,
    host: HostOs,
) -> ShellInvocation {
    match (kind, host.is_windows()) {
        (ShellKind::Bash, true) => {
            let command = match cwd {
                Some(dir) => format!("cd '{dir}' && {command}"),
                None => command.to_string(),
            };
            ShellInvocation {
                program: "wsl".to_string(),
                args: vec!["bash".to_string(), "-lc".to_string(), command],
            }
        },
        (ShellKind::Bash, false) => ShellInvocation {
            program: "bash".to_string(),
            args: vec!["-lc".to_string(), command.to_string()],
        },
        (ShellKind::Powershell, true) => ShellInvocation {
            program: "powershell.exe".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
                command.to_string(),
            ],
        },
        (ShellKind::Powershell, false) => ShellInvocation {
            program: "pwsh".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-Command".to_string(),
                command.to_string(),
            ],
        },
        (ShellKind::Cmd, true) => ShellInvocation {
            program: "cmd.exe".to_string(),
            args: vec!["/c".to_string(), command.to_string()],
        },
        // No cmd interpreter outside Windows; run through bash without
        // login-shell initialization.
        (ShellKind::Cmd, false) => ShellInvocation {
            program: "bash".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
        },
    }
}
