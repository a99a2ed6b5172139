//! # In-Memory Coordination Service
//!
//! A single-process stand-in for a hierarchical coordination service. Every
//! mutation and the watch dispatch it causes happen under one lock, so all
//! observers see changes in the same order.

use crate::client::InMemoryClient;
use crate::tree::NodeTree;
use crate::watch::{WatchEntry, WatchRegistry};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use warden_core::path::{ancestors, parent_path, validate_path};
use warden_core::{
    ChildData, ChildEventKind, ChildrenWatch, ClientConfig, CoordinationError, CreateMode,
    NodeMetadata, Result, SessionId, WatchId,
};

/// Liveness of a session as seen by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connected,
    /// Disconnected but not yet expired
    Suspended,
}

#[derive(Debug)]
struct SessionEntry {
    status: SessionStatus,
    timeout: Duration,
    /// Bumped on every suspension so a stale expiry timer can tell it lost
    suspend_generation: u64,
    ephemerals: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct ServiceState {
    tree: NodeTree,
    sessions: HashMap<SessionId, SessionEntry>,
    watches: WatchRegistry,
    /// Mutex path -> holding session
    mutexes: HashMap<String, SessionId>,
}

impl ServiceState {
    fn is_reachable(sessions: &HashMap<SessionId, SessionEntry>, session: SessionId) -> bool {
        matches!(
            sessions.get(&session).map(|s| s.status),
            Some(SessionStatus::Connected)
        )
    }

    fn child_data(&self, path: &str) -> Option<ChildData> {
        self.tree.get(path).map(|entry| ChildData {
            path: path.to_string(),
            payload: entry.payload.clone(),
            metadata: entry.metadata(),
        })
    }

    fn notify_child(&mut self, path: &str, kind: ChildEventKind, data: &ChildData) {
        if let Some(parent) = parent_path(path) {
            let sessions = &self.sessions;
            self.watches
                .dispatch_child(parent, kind, data, |s| Self::is_reachable(sessions, s));
        }
    }

    fn require_connected(&self, session: SessionId) -> Result<()> {
        match self.sessions.get(&session).map(|s| s.status) {
            Some(SessionStatus::Connected) => Ok(()),
            Some(SessionStatus::Suspended) => Err(CoordinationError::connection_loss(format!(
                "session {} is suspended",
                session
            ))),
            None => Err(CoordinationError::SessionExpired {
                session_id: session,
            }),
        }
    }

    fn create_node(
        &mut self,
        session: SessionId,
        path: &str,
        payload: Bytes,
        mode: CreateMode,
    ) -> Result<()> {
        self.tree.create(path, payload, mode, session)?;
        if mode.is_ephemeral() {
            if let Some(entry) = self.sessions.get_mut(&session) {
                entry.ephemerals.insert(path.to_string());
            }
        }
        if let Some(data) = self.child_data(path) {
            self.notify_child(path, ChildEventKind::ChildAdded, &data);
        }
        Ok(())
    }

    fn delete_node(&mut self, path: &str) -> Result<()> {
        let data = self.child_data(path);
        let removed = self.tree.delete(path)?;
        if let Some(owner) = removed.ephemeral_owner {
            if let Some(entry) = self.sessions.get_mut(&owner) {
                entry.ephemerals.remove(path);
            }
        }
        if let Some(data) = data {
            self.notify_child(path, ChildEventKind::ChildRemoved, &data);
        }
        Ok(())
    }
}

struct Shared {
    state: Mutex<ServiceState>,
    /// Wakes waiters of a mutex path when it is released
    mutex_released: DashMap<String, Arc<Notify>>,
    last_session: AtomicI64,
}

/// Handle to an in-process coordination service.
///
/// Clones share the same service. Clients are obtained through
/// [`connect`](Self::connect); each started client owns one session.
///
/// # Examples
///
/// ```rust
/// use warden_core::{ClientConfig, CoordinationClient, CreateMode};
/// use warden_memory::InMemoryCoordinator;
///
/// # tokio_test::block_on(async {
/// let service = InMemoryCoordinator::new();
/// let client = service.connect(ClientConfig::default());
/// client.start().await.unwrap();
/// client
///     .create("/jobs/owner", b"a", CreateMode::Ephemeral, true)
///     .await
///     .unwrap();
/// assert_eq!(service.ephemeral_owner("/jobs/owner"), Some(client.session_id().unwrap()));
///
/// client.close().await.unwrap();
/// assert_eq!(service.ephemeral_owner("/jobs/owner"), None);
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryCoordinator {
    shared: Arc<Shared>,
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCoordinator")
            .field("sessions", &self.session_count())
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState::default()),
                mutex_released: DashMap::new(),
                last_session: AtomicI64::new(0x100),
            }),
        }
    }

    /// Create a client bound to this service. The client opens its session
    /// on `start()`.
    pub fn connect(&self, config: ClientConfig) -> InMemoryClient {
        InMemoryClient::new(self.clone(), config)
    }

    // Session lifecycle

    pub(crate) fn open_session(&self, timeout: Duration) -> SessionId {
        let id = SessionId(self.shared.last_session.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.shared.state.lock();
        state.sessions.insert(
            id,
            SessionEntry {
                status: SessionStatus::Connected,
                timeout,
                suspend_generation: 0,
                ephemerals: BTreeSet::new(),
            },
        );
        info!(session = %id, "session opened");
        id
    }

    /// End a session the client closed deliberately.
    pub(crate) fn close_session(&self, session: SessionId) {
        self.end_session(session, None);
    }

    /// Expire a session immediately, as the service does when a client stays
    /// away longer than its session timeout. The session's watches receive
    /// `ConnectionLost`, then its ephemeral nodes are deleted and its mutexes
    /// released.
    pub fn expire_session(&self, session: SessionId) -> bool {
        self.end_session(session, Some(ChildEventKind::ConnectionLost))
    }

    /// Disconnect a session without ending it. Watches of the session receive
    /// `ConnectionSuspended` and stop receiving child events; operations of
    /// the session fail with connection loss after the client's retry policy
    /// runs out. If the session is not reconnected within its timeout it
    /// expires.
    pub fn suspend_session(&self, session: SessionId) -> bool {
        let (generation, timeout) = {
            let mut state = self.shared.state.lock();
            let Some(entry) = state.sessions.get_mut(&session) else {
                return false;
            };
            if entry.status == SessionStatus::Suspended {
                return true;
            }
            entry.status = SessionStatus::Suspended;
            entry.suspend_generation += 1;
            let result = (entry.suspend_generation, entry.timeout);
            state
                .watches
                .dispatch_connection(session, ChildEventKind::ConnectionSuspended);
            result
        };
        warn!(session = %session, "session suspended");

        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_suspended = {
                let state = service.shared.state.lock();
                state.sessions.get(&session).is_some_and(|entry| {
                    entry.status == SessionStatus::Suspended
                        && entry.suspend_generation == generation
                })
            };
            if still_suspended {
                warn!(session = %session, "session timed out while suspended");
                service.expire_session(session);
            }
        });
        true
    }

    /// Restore a suspended session. Its watches receive
    /// `ConnectionReconnected`; changes made meanwhile are only reported once
    /// a watch is rebuilt.
    pub fn reconnect_session(&self, session: SessionId) -> bool {
        let mut state = self.shared.state.lock();
        let Some(entry) = state.sessions.get_mut(&session) else {
            return false;
        };
        if entry.status == SessionStatus::Connected {
            return true;
        }
        entry.status = SessionStatus::Connected;
        state
            .watches
            .dispatch_connection(session, ChildEventKind::ConnectionReconnected);
        info!(session = %session, "session reconnected");
        true
    }

    pub fn session_status(&self, session: SessionId) -> Option<SessionStatus> {
        self.shared
            .state
            .lock()
            .sessions
            .get(&session)
            .map(|entry| entry.status)
    }

    fn end_session(&self, session: SessionId, notice: Option<ChildEventKind>) -> bool {
        let released = {
            let mut state = self.shared.state.lock();
            let Some(entry) = state.sessions.remove(&session) else {
                return false;
            };
            if let Some(kind) = notice {
                state.watches.dispatch_connection(session, kind);
            }
            let watches = state.watches.remove_session(session);

            for path in &entry.ephemerals {
                if let Err(e) = state.delete_node(path) {
                    warn!(session = %session, path = %path, error = %e, "failed to delete ephemeral node");
                }
            }

            let released: Vec<String> = state
                .mutexes
                .iter()
                .filter(|(_, holder)| **holder == session)
                .map(|(path, _)| path.clone())
                .collect();
            for path in &released {
                state.mutexes.remove(path);
            }

            info!(
                session = %session,
                ephemerals = entry.ephemerals.len(),
                watches,
                mutexes = released.len(),
                expired = notice.is_some(),
                "session ended"
            );
            released
        };
        for path in released {
            self.wake_mutex_waiters(&path);
        }
        true
    }

    // Node operations

    pub(crate) fn exists(&self, session: SessionId, path: &str) -> Result<Option<NodeMetadata>> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        state.require_connected(session)?;
        Ok(state.tree.get(path).map(|entry| entry.metadata()))
    }

    pub(crate) fn create(
        &self,
        session: SessionId,
        path: &str,
        payload: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<String> {
        validate_path(path)?;
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;

        if create_parents {
            for ancestor in ancestors(path) {
                if state.tree.contains(ancestor) {
                    continue;
                }
                match state.create_node(session, ancestor, Bytes::new(), CreateMode::Persistent) {
                    Ok(()) => debug!(path = %ancestor, "created parent node"),
                    Err(e) if e.is_node_exists() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        state.create_node(session, path, Bytes::copy_from_slice(payload), mode)?;
        debug!(session = %session, path = %path, mode = %mode, "node created");
        Ok(path.to_string())
    }

    pub(crate) fn get_data(&self, session: SessionId, path: &str) -> Result<(Bytes, NodeMetadata)> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        state.require_connected(session)?;
        state
            .tree
            .get(path)
            .map(|entry| (entry.payload.clone(), entry.metadata()))
            .ok_or_else(|| CoordinationError::NoNode {
                path: path.to_string(),
            })
    }

    pub(crate) fn set_data(
        &self,
        session: SessionId,
        path: &str,
        payload: &[u8],
    ) -> Result<NodeMetadata> {
        validate_path(path)?;
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;
        let metadata = state
            .tree
            .set_data(path, Bytes::copy_from_slice(payload))?
            .metadata();
        if let Some(data) = state.child_data(path) {
            state.notify_child(path, ChildEventKind::ChildUpdated, &data);
        }
        Ok(metadata)
    }

    pub(crate) fn delete(&self, session: SessionId, path: &str) -> Result<()> {
        validate_path(path)?;
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;
        state.delete_node(path)
    }

    pub(crate) fn get_children(&self, session: SessionId, path: &str) -> Result<Vec<String>> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        state.require_connected(session)?;
        state
            .tree
            .get(path)
            .map(|entry| entry.children.iter().cloned().collect())
            .ok_or_else(|| CoordinationError::NoNode {
                path: path.to_string(),
            })
    }

    // Watches

    pub(crate) fn watch_children(
        &self,
        session: SessionId,
        path: &str,
        initial_sync: bool,
    ) -> Result<ChildrenWatch> {
        validate_path(path)?;
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = WatchId::new();
        let mut entry = WatchEntry::new(session, path.to_string(), tx);
        let existing: Vec<ChildData> = state
            .tree
            .child_paths(path)
            .iter()
            .filter_map(|child| state.child_data(child))
            .collect();

        if initial_sync {
            for data in existing {
                entry.deliver(warden_core::ChildEvent::child(ChildEventKind::ChildAdded, data));
            }
            entry.deliver(warden_core::ChildEvent::initialized());
        } else {
            for data in existing {
                entry.prime(data);
            }
        }
        state.watches.insert(id, entry);

        Ok(ChildrenWatch {
            id,
            path: path.to_string(),
            events: rx,
        })
    }

    pub(crate) fn rebuild_watch(&self, session: SessionId, watch: &WatchId) -> Result<usize> {
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;
        let path = match state.watches.get_mut(watch) {
            Some(entry) if entry.session == session => entry.path.clone(),
            _ => {
                return Err(CoordinationError::internal(format!(
                    "watch {} is not registered for session {}",
                    watch, session
                )))
            }
        };
        let current: Vec<ChildData> = state
            .tree
            .child_paths(&path)
            .iter()
            .filter_map(|child| state.child_data(child))
            .collect();
        let delivered = state
            .watches
            .get_mut(watch)
            .map(|entry| entry.resync(current))
            .unwrap_or_default();
        debug!(watch = %watch, path = %path, delivered, "watch rebuilt");
        Ok(delivered)
    }

    pub(crate) fn unwatch(&self, session: SessionId, watch: &WatchId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let owner = state.watches.get_mut(watch).map(|entry| entry.session);
        match owner {
            Some(owner) if owner == session => {
                state.watches.remove(watch);
                Ok(())
            }
            Some(_) => Err(CoordinationError::internal(format!(
                "watch {} belongs to another session",
                watch
            ))),
            None => Ok(()),
        }
    }

    // Distributed mutex

    /// Try to take the mutex at `path` for `session` without waiting.
    pub(crate) fn try_lock(&self, session: SessionId, path: &str) -> Result<bool> {
        let mut state = self.shared.state.lock();
        state.require_connected(session)?;
        if state.mutexes.contains_key(path) {
            return Ok(false);
        }
        state.mutexes.insert(path.to_string(), session);
        Ok(true)
    }

    pub(crate) fn unlock(&self, session: SessionId, path: &str) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            match state.mutexes.get(path) {
                Some(holder) if *holder == session => {
                    state.mutexes.remove(path);
                }
                _ => {
                    return Err(CoordinationError::NotLockHolder {
                        path: path.to_string(),
                    })
                }
            }
        }
        self.wake_mutex_waiters(path);
        Ok(())
    }

    pub(crate) fn mutex_notifier(&self, path: &str) -> Arc<Notify> {
        self.shared
            .mutex_released
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn wake_mutex_waiters(&self, path: &str) {
        if let Some(notify) = self.shared.mutex_released.get(path) {
            notify.notify_waiters();
        }
    }

    // Introspection

    pub fn session_count(&self) -> usize {
        self.shared.state.lock().sessions.len()
    }

    /// Number of nodes, excluding the root.
    pub fn node_count(&self) -> usize {
        self.shared.state.lock().tree.len()
    }

    pub fn watch_count(&self) -> usize {
        self.shared.state.lock().watches.len()
    }

    /// Session owning the ephemeral node at `path`.
    pub fn ephemeral_owner(&self, path: &str) -> Option<SessionId> {
        self.shared
            .state
            .lock()
            .tree
            .get(path)
            .and_then(|entry| entry.ephemeral_owner)
    }

    /// Payload of the node at `path`.
    pub fn data(&self, path: &str) -> Option<Bytes> {
        self.shared
            .state
            .lock()
            .tree
            .get(path)
            .map(|entry| entry.payload.clone())
    }

    pub fn mutex_holder(&self, path: &str) -> Option<SessionId> {
        self.shared.state.lock().mutexes.get(path).copied()
    }
}
