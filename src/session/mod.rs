//! The session subsystem: per-client keyed data bound to a cookie-carried
//! identity, persisted through a pluggable driver and protected from
//! concurrent I/O by a per-session job queue.

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::error::EmbernetError;

/// Pluggable persistence drivers.
pub mod driver;

/// Cookie-bound identity, cache and lifecycle.
pub mod manager;

/// The serialized per-session job queue.
pub mod storage;

use driver::SessionDriver;
use storage::SessionStorage;

/// Lifecycle of one session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not attached to an exchange, not persisted.
    Unbound,
    /// Attached to an exchange, no id yet.
    BoundTransient,
    /// Attached, id present, driver knows the id.
    BoundPersistent,
    /// Id and data cleared; every further operation is an idempotent no-op.
    Destroyed,
}

struct SessionInner {
    id: Option<String>,
    data: AHashMap<String, serde_json::Value>,
    state: SessionState,
    dirty: bool,
}

/// A per-client keyed data store.
///
/// All data mutations and state transitions go through the session's own
/// monitor, one per session; concurrent exchanges sharing a session through
/// the cache serialize on it. Driver I/O never runs under the monitor; it
/// goes through the session's [`SessionStorage`] queue instead.
pub struct Session {
    inner: Mutex<SessionInner>,
    storage: SessionStorage,
}

impl Session {
    pub(crate) fn new(driver: Arc<dyn SessionDriver>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SessionInner {
                id: None,
                data: AHashMap::new(),
                state: SessionState::Unbound,
                dirty: false,
            }),
            storage: SessionStorage::new(driver),
        })
    }

    /// The session id, present only while persistent.
    pub fn id(&self) -> Option<String> {
        self.inner.lock().id.clone()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// True exactly when an id is present and the driver reported it
    /// stored.
    pub fn is_persistent(&self) -> bool {
        self.inner.lock().state == SessionState::BoundPersistent
    }

    /// Stores a value under `key`. No-op on a destroyed session.
    pub fn put<V: Serialize>(&self, key: impl Into<String>, value: V) -> Result<(), EmbernetError> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Destroyed {
            return Ok(());
        }
        inner.data.insert(key.into(), value);
        inner.dirty = true;
        Ok(())
    }

    /// Reads the value under `key`, deserialized into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.lock();
        inner
            .data
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Removes and returns the raw value under `key`. No-op on a destroyed
    /// session.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Destroyed {
            return None;
        }
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.dirty = true;
        }
        removed
    }

    /// Drops every stored value.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Destroyed {
            return;
        }
        if !inner.data.is_empty() {
            inner.dirty = true;
        }
        inner.data.clear();
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// True when no value is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues a `Save` through the session's storage queue. No-op while
    /// the session has no id.
    pub async fn save(&self) {
        self.storage.perform(self, storage::SessionJob::Save).await;
    }

    /// Enqueues a `Migrate` that copies this session's record out of
    /// another driver and into the owning one. No-op while the session has
    /// no id.
    pub async fn migrate(&self, from: Arc<dyn SessionDriver>) {
        self.storage
            .perform(self, storage::SessionJob::Migrate(from))
            .await;
    }

    /// The storage queue serializing this session's driver access.
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Whether there are unsaved data mutations.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// A snapshot of the stored entries, for drivers persisting the
    /// session.
    pub fn data_snapshot(&self) -> Vec<(String, serde_json::Value)> {
        let inner = self.inner.lock();
        inner
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Atomically replaces the stored entries, for drivers loading the
    /// session.
    pub fn replace_data(&self, entries: Vec<(String, serde_json::Value)>) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Destroyed {
            return;
        }
        inner.data = entries.into_iter().collect();
        inner.dirty = false;
    }

    pub(crate) fn mark_clean(&self) {
        self.inner.lock().dirty = false;
    }

    pub(crate) fn mark_bound_transient(&self) {
        let mut inner = self.inner.lock();
        inner.state = SessionState::BoundTransient;
    }

    pub(crate) fn mark_tentative_persistent(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.id = Some(id.to_string());
        inner.state = SessionState::BoundPersistent;
    }

    pub(crate) fn demote_to_transient(&self) {
        let mut inner = self.inner.lock();
        inner.id = None;
        inner.data.clear();
        inner.dirty = false;
        inner.state = SessionState::BoundTransient;
    }

    pub(crate) fn promote_persistent(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.id = Some(id.to_string());
        inner.state = SessionState::BoundPersistent;
    }

    pub(crate) fn mark_destroyed(&self) {
        let mut inner = self.inner.lock();
        inner.id = None;
        inner.data.clear();
        inner.dirty = false;
        inner.state = SessionState::Destroyed;
    }
}
