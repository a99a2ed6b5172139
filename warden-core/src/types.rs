//! # Core Types
//!
//! Values exchanged between the coordination client and the primitives
//! built on top of it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a client's live lease on the coordination service.
///
/// Session ids are assigned by the service when a client starts. Ephemeral
/// nodes remember the session that created them, which is what ownership
/// checks compare against.
///
/// # Examples
///
/// ```rust
/// use warden_core::SessionId;
///
/// let session = SessionId::new(0x1f);
/// assert_eq!(session.to_string(), "0x000000000000001f");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl SessionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Deleted automatically when the creating session ends
    Ephemeral,
    /// Survives session end; deleted only explicitly
    Persistent,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral)
    }
}

impl fmt::Display for CreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateMode::Ephemeral => write!(f, "EPHEMERAL"),
            CreateMode::Persistent => write!(f, "PERSISTENT"),
        }
    }
}

/// Metadata kept by the service for every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Service-wide sequence number of the create that produced this node;
    /// distinguishes a recreated node from the one it replaced
    pub creation_id: u64,
    /// Number of data changes since creation
    pub version: u64,
    /// Session that owns the node, present only for ephemeral nodes
    pub ephemeral_owner: Option<SessionId>,
    /// Creation time (unix millis)
    pub created_at: u64,
    /// Last modification time (unix millis)
    pub modified_at: u64,
    pub data_length: usize,
    pub num_children: usize,
}

impl NodeMetadata {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner.is_some()
    }

    /// Whether the node is owned by the given session.
    pub fn is_owned_by(&self, session: SessionId) -> bool {
        self.ephemeral_owner == Some(session)
    }
}

/// A child node as seen by a children watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildData {
    pub path: String,
    pub payload: Bytes,
    pub metadata: NodeMetadata,
}

/// Kinds of events delivered by a children watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildEventKind {
    /// Initial sync of existing children is complete
    Initialized,
    ChildAdded,
    ChildRemoved,
    ChildUpdated,
    ConnectionLost,
    ConnectionSuspended,
    ConnectionReconnected,
}

impl ChildEventKind {
    /// Whether the event reports a connection state change rather than a
    /// change in the watched children.
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            ChildEventKind::ConnectionLost
                | ChildEventKind::ConnectionSuspended
                | ChildEventKind::ConnectionReconnected
        )
    }
}

impl fmt::Display for ChildEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChildEventKind::Initialized => "INITIALIZED",
            ChildEventKind::ChildAdded => "CHILD_ADDED",
            ChildEventKind::ChildRemoved => "CHILD_REMOVED",
            ChildEventKind::ChildUpdated => "CHILD_UPDATED",
            ChildEventKind::ConnectionLost => "CONNECTION_LOST",
            ChildEventKind::ConnectionSuspended => "CONNECTION_SUSPENDED",
            ChildEventKind::ConnectionReconnected => "CONNECTION_RECONNECTED",
        };
        write!(f, "{}", name)
    }
}

/// Event delivered by a children watch.
///
/// `data` is present for child events and absent for `Initialized` and the
/// connection events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEvent {
    pub kind: ChildEventKind,
    pub data: Option<ChildData>,
}

impl ChildEvent {
    pub fn initialized() -> Self {
        Self {
            kind: ChildEventKind::Initialized,
            data: None,
        }
    }

    pub fn connection(kind: ChildEventKind) -> Self {
        debug_assert!(kind.is_connection_event());
        Self { kind, data: None }
    }

    pub fn child(kind: ChildEventKind, data: ChildData) -> Self {
        Self {
            kind,
            data: Some(data),
        }
    }

    /// Path of the child this event is about, if any.
    pub fn path(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.path.as_str())
    }
}

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created but not started
    Latent,
    Connected,
    /// Temporarily disconnected, session may still be alive
    Suspended,
    /// Session ended by the service
    Lost,
    /// Closed by the client
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether the session behind this state can never be used again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Lost | ConnectionState::Closed)
    }
}

/// Identifier of a children watch registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(Uuid);

impl WatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
