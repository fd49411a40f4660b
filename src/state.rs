//! Application state records and the keyed state store.
//!
//! Exactly one [`AppState`] exists per known application identifier. Records
//! are created lazily the first time an identifier is referenced and removed
//! only when the surrounding system deletes the application. The store is
//! constructed once and shared by handle; there is no global instance.

use chrono::{Local, SecondsFormat};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::spec::AppSpec;

/// Lifecycle status of one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStatus {
    /// Not running and not being started.
    Stopped,
    /// Start steps executed; waiting to become healthy.
    Starting,
    /// Healthy.
    Running,
    /// Start failed or the health wait timed out.
    Error,
}

/// Mutable state record for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// Application identifier (equals the owning specification's id).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Workspace path as declared.
    pub workspace: String,
    /// Current lifecycle status.
    pub status: AppStatus,
    /// Human-readable detail for the current status.
    #[serde(default)]
    pub message: Option<String>,
    /// RFC 3339 timestamp of the last status update.
    #[serde(default)]
    pub last_check: Option<String>,
    /// Declared ports, cached from the specification.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Declared open URLs, cached from the specification.
    #[serde(default)]
    pub open_urls: Vec<String>,
}

impl AppState {
    /// Fresh `Stopped` record seeded from a specification.
    fn new(spec: &AppSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            workspace: spec.workspace.clone(),
            status: AppStatus::Stopped,
            message: None,
            last_check: None,
            ports: spec.ports.clone(),
            open_urls: spec.open.clone(),
        }
    }
}

/// Current local time in RFC 3339, used to stamp `last_check`.
fn now_stamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Keyed store of application state records.
///
/// Cheap to clone; clones share the same underlying map. Mutations are
/// short critical sections and the lock is never held across an await, so
/// concurrent workflows interleave with last-observation-wins semantics on
/// the status and message fields.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<HashMap<String, AppState>>>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &str) -> Option<AppState> {
        self.inner.read().get(id).cloned()
    }

    /// Snapshot of every record, ordered by identifier.
    pub fn all(&self) -> Vec<AppState> {
        let mut states: Vec<AppState> = self.inner.read().values().cloned().collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    /// Ensure a record exists for the specification, creating a `Stopped`
    /// one if this identifier has never been seen. Returns a snapshot.
    pub fn ensure(&self, spec: &AppSpec) -> AppState {
        let mut map = self.inner.write();
        map.entry(spec.id.clone())
            .or_insert_with(|| AppState::new(spec))
            .clone()
    }

    /// Apply a mutation to an existing record. Returns false if the
    /// identifier is unknown.
    pub fn update<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut AppState),
    {
        let mut map = self.inner.write();
        match map.get_mut(id) {
            Some(state) => {
                mutate(state);
                true
            },
            None => false,
        }
    }

    /// Set status and message and stamp `last_check`. Returns false if the
    /// identifier is unknown.
    pub fn set_status(&self, id: &str, status: AppStatus, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(id, |state| {
            state.status = status;
            state.message = Some(message);
            state.last_check = Some(now_stamp());
        })
    }

    /// Remove a record (the surrounding system deleted the application).
    /// Returns false if the identifier was unknown.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.write().remove(id).is_some()
    }
}
