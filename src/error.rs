//! Error types for supervisor operations.
//!
//! Start failures surface to callers both as typed errors and as the
//! human-readable state message, so the `Display` text here is exactly
//! what a user sees in the application state.

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors raised while starting, probing, or tearing down an application.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The configured workspace directory does not exist.
    #[error("Workspace not found: {path}")]
    WorkspaceNotFound { path: String },

    /// A start step could not be spawned (missing executable, bad
    /// permissions, unwritable log file).
    #[error("Failed to start command: {reason}")]
    SpawnFailed { reason: String },

    /// A start step exited within the spawn grace period.
    ///
    /// On Unix, a signal death is reported as the negated signal number.
    #[error("Process exited immediately with code {code}")]
    ExitedImmediately { code: i32 },

    /// The application never became healthy within the derived wait budget.
    #[error("Health check timeout after {seconds}s")]
    HealthTimeout { seconds: u64 },

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    /// Create a workspace-not-found error.
    pub fn workspace_not_found(path: impl Into<String>) -> Self {
        Self::WorkspaceNotFound { path: path.into() }
    }

    /// Create a spawn-failed error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create an exited-immediately error.
    pub const fn exited_immediately(code: i32) -> Self {
        Self::ExitedImmediately { code }
    }

    /// Create a health-timeout error.
    pub const fn health_timeout(seconds: u64) -> Self {
        Self::HealthTimeout { seconds }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_state_text() {
        assert_eq!(
            SupervisorError::workspace_not_found("/srv/app").to_string(),
            "Workspace not found: /srv/app"
        );
        assert_eq!(
            SupervisorError::exited_immediately(1).to_string(),
            "Process exited immediately with code 1"
        );
        assert_eq!(
            SupervisorError::health_timeout(120).to_string(),
            "Health check timeout after 120s"
        );
        assert_eq!(
            SupervisorError::spawn_failed("boom").to_string(),
            "Failed to start command: boom"
        );
    }

    #[test]
    fn test_signal_death_code_convention() {
        // SIGKILL shows up as -9, mirroring how exit codes are read back.
        assert_eq!(
            SupervisorError::exited_immediately(-9).to_string(),
            "Process exited immediately with code -9"
        );
    }
}
