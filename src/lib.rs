// =============================================================================
// Lint Configuration
// =============================================================================

// Safety: deny unsafe by default, allow only where documented
// (Unix setsid in process/mod.rs, env mutation in path tests)
#![deny(unsafe_code)]
// Correctness: Must handle all fallible operations
#![deny(unused_must_use)]
// Quality: Pedantic but pragmatic
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
#![allow(missing_debug_implementations)] // Supervisor holds a dyn OsBridge which lacks Debug
//
// Allowed with documented reasons
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::missing_panics_doc)] // Panics documented where they can occur
#![allow(clippy::module_name_repetitions)] // e.g., supervisor::SupervisorError is clearer
#![allow(clippy::doc_markdown)] // Too many false positives in code docs
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation

//! Application lifecycle supervisor.
//!
//! appdock starts externally defined long-running applications via shell
//! commands, decides whether they are healthy, tracks their lifecycle
//! state, terminates whole process trees cleanly, and resolves which URL
//! a user should actually open when a process runs inside WSL while the
//! controlling host is Windows.
//!
//! The crate is a library: the surrounding system supplies the list of
//! [`AppSpec`] definitions and calls the [`Supervisor`] operations; no
//! HTTP layer or CLI lives here.
//!
//! # Example
//!
//! ```no_run
//! use appdock::{AppSpec, HealthProbe, StartStep, Supervisor, SupervisorConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let supervisor = Supervisor::new(SupervisorConfig::load()?)?;
//!
//! let spec = AppSpec::new("web", "Web Frontend", "~/projects/web")
//!     .with_step(StartStep::bash("npm run dev"))
//!     .with_probe(HealthProbe::new("http://localhost:5173/"))
//!     .with_open_url("http://localhost:5173/");
//!
//! let outcome = supervisor.launch(&spec).await;
//! println!("{}: {}", spec.name, outcome.message);
//! for url in &outcome.open_urls {
//!     println!("  open {url}");
//! }
//! # Ok(())
//! # }
//! ```

/// Per-application log files with size-based rotation.
pub mod applog;

/// Supervisor configuration loaded from `~/.appdock/config.toml`.
pub mod config;

/// Centralized constants for timeouts, grace periods, and defaults.
pub mod constants;

/// Error types for supervisor operations.
pub mod error;

/// Health evaluation over HTTP probes, port checks, and process liveness.
pub mod health;

/// Host OS detection and the WSL bridge interface.
pub mod host;

/// Structured logging setup for embedding binaries.
pub mod logging;

/// TCP/HTTP probe primitives and the cross-environment URL resolver.
pub mod net;

/// Workspace path expansion and WSL UNC path classification.
pub mod paths;

/// Process spawning, tracking, and process-tree termination.
pub mod process;

/// Shell invocation construction for start steps.
pub mod shell;

/// Immutable application specifications.
pub mod spec;

/// Application state records and the keyed state store.
pub mod state;

/// The lifecycle coordinator.
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use host::{HostOs, NativeBridge, OsBridge};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use spec::{AppSpec, HealthProbe, ShellKind, StartStep};
pub use state::{AppState, AppStatus};
pub use supervisor::{LaunchOutcome, LaunchStatus, Supervisor};
