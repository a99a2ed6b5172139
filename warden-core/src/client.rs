//! The coordination client contract.
//!
//! Both primitives talk to the coordination service exclusively through
//! [`CoordinationClient`]. Any implementation providing these capabilities
//! (a networked client, or the in-process service in `warden-memory`) can be
//! plugged in.

use crate::{ChildEvent, ConnectionState, CreateMode, NodeMetadata, Result, SessionId, WatchId};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

/// A registered children watch.
///
/// Events for one watched path arrive on `events` in the order the service
/// observed the underlying changes. Connection state changes of the owning
/// session are delivered on the same stream.
#[derive(Debug)]
pub struct ChildrenWatch {
    pub id: WatchId,
    pub path: String,
    pub events: mpsc::UnboundedReceiver<ChildEvent>,
}

impl ChildrenWatch {
    /// Wait for the next event, `None` once the watch is gone.
    pub async fn next_event(&mut self) -> Option<ChildEvent> {
        self.events.recv().await
    }
}

/// Capabilities consumed from the coordination service.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Open the session. Starting an already started client is a no-op.
    async fn start(&self) -> Result<()>;

    /// End the session deliberately; ephemeral nodes and mutexes of the
    /// session are released by the service.
    async fn close(&self) -> Result<()>;

    fn is_started(&self) -> bool;

    fn state(&self) -> ConnectionState;

    /// Id of the current session.
    fn session_id(&self) -> Result<SessionId>;

    async fn exists(&self, path: &str) -> Result<Option<NodeMetadata>>;

    /// Create a node, returning its path. Parents created on demand are
    /// persistent.
    async fn create(
        &self,
        path: &str,
        payload: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<String>;

    async fn get_data(&self, path: &str) -> Result<(Bytes, NodeMetadata)>;

    async fn set_data(&self, path: &str, payload: &[u8]) -> Result<NodeMetadata>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Names of the direct children, sorted.
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Watch the direct children of `path`.
    ///
    /// With `initial_sync`, existing children are delivered as `ChildAdded`
    /// followed by a single `Initialized` event.
    async fn watch_children(&self, path: &str, initial_sync: bool) -> Result<ChildrenWatch>;

    /// Resynchronize a watch's cache with the service, delivering any
    /// change the watch has not reported yet.
    async fn rebuild_watch(&self, watch: &WatchId) -> Result<()>;

    async fn unwatch(&self, watch: &WatchId) -> Result<()>;

    /// Acquire the distributed mutex scoped to `path`, waiting at most
    /// `timeout`. Returns whether the mutex is now held by this session.
    async fn acquire_mutex(&self, path: &str, timeout: Duration) -> Result<bool>;

    async fn release_mutex(&self, path: &str) -> Result<()>;
}
