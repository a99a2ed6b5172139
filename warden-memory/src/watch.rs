//! # Children Watch Registry
//!
//! Keeps every children watch with its per-watch cache and fans out child
//! events in the order mutations are applied.

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::debug;
use warden_core::{ChildData, ChildEvent, ChildEventKind, SessionId, WatchId};

/// A registered watch and what it has reported so far.
#[derive(Debug)]
pub struct WatchEntry {
    pub session: SessionId,
    pub path: String,
    sender: mpsc::UnboundedSender<ChildEvent>,
    /// Children as last reported, keyed by full path
    cache: HashMap<String, ChildData>,
}

impl WatchEntry {
    pub fn new(session: SessionId, path: String, sender: mpsc::UnboundedSender<ChildEvent>) -> Self {
        Self {
            session,
            path,
            sender,
            cache: HashMap::new(),
        }
    }

    /// Record a child in the cache without reporting it.
    pub fn prime(&mut self, data: ChildData) {
        self.cache.insert(data.path.clone(), data);
    }

    /// Deliver an event, keeping the cache in step. Returns false when the
    /// receiving side is gone.
    pub fn deliver(&mut self, event: ChildEvent) -> bool {
        if let Some(data) = &event.data {
            match event.kind {
                ChildEventKind::ChildAdded | ChildEventKind::ChildUpdated => {
                    self.cache.insert(data.path.clone(), data.clone());
                }
                ChildEventKind::ChildRemoved => {
                    self.cache.remove(&data.path);
                }
                _ => {}
            }
        }
        self.sender.send(event).is_ok()
    }

    /// Diff the cache against the current children and deliver whatever
    /// changed. Returns the number of events delivered.
    pub fn resync(&mut self, current: Vec<ChildData>) -> usize {
        let mut events = Vec::new();
        let mut removed = Vec::new();
        let mut seen = HashSet::with_capacity(current.len());

        for data in current {
            match self.cache.get(&data.path) {
                None => events.push(ChildEvent::child(ChildEventKind::ChildAdded, data.clone())),
                // Vacated and refilled during the gap
                Some(cached) if cached.metadata.creation_id != data.metadata.creation_id => {
                    removed.push(cached.clone());
                    events.push(ChildEvent::child(ChildEventKind::ChildAdded, data.clone()));
                }
                Some(cached) if cached.metadata != data.metadata => {
                    events.push(ChildEvent::child(ChildEventKind::ChildUpdated, data.clone()))
                }
                Some(_) => {}
            }
            seen.insert(data.path.clone());
        }

        removed.extend(
            self.cache
                .values()
                .filter(|cached| !seen.contains(&cached.path))
                .cloned(),
        );
        removed.sort_by(|a, b| a.path.cmp(&b.path));
        let mut ordered: Vec<ChildEvent> = removed
            .into_iter()
            .map(|data| ChildEvent::child(ChildEventKind::ChildRemoved, data))
            .collect();
        ordered.extend(events);

        let count = ordered.len();
        for event in ordered {
            self.deliver(event);
        }
        count
    }

    pub fn cached_children(&self) -> usize {
        self.cache.len()
    }
}

/// All watches of one service.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: HashMap<WatchId, WatchEntry>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: WatchId, entry: WatchEntry) {
        debug!(watch = %id, path = %entry.path, session = %entry.session, "watch registered");
        self.watches.insert(id, entry);
    }

    pub fn get_mut(&mut self, id: &WatchId) -> Option<&mut WatchEntry> {
        self.watches.get_mut(id)
    }

    pub fn remove(&mut self, id: &WatchId) -> Option<WatchEntry> {
        self.watches.remove(id)
    }

    /// Deliver a child event to every watch on `parent` whose session can
    /// currently receive events.
    pub fn dispatch_child<F>(
        &mut self,
        parent: &str,
        kind: ChildEventKind,
        data: &ChildData,
        is_reachable: F,
    ) where
        F: Fn(SessionId) -> bool,
    {
        let mut closed = Vec::new();
        for (id, entry) in self.watches.iter_mut() {
            if entry.path != parent || !is_reachable(entry.session) {
                continue;
            }
            if !entry.deliver(ChildEvent::child(kind, data.clone())) {
                closed.push(*id);
            }
        }
        self.drop_closed(closed);
    }

    /// Deliver a connection event to every watch of a session.
    pub fn dispatch_connection(&mut self, session: SessionId, kind: ChildEventKind) {
        let mut closed = Vec::new();
        for (id, entry) in self.watches.iter_mut() {
            if entry.session == session && !entry.deliver(ChildEvent::connection(kind)) {
                closed.push(*id);
            }
        }
        self.drop_closed(closed);
    }

    /// Remove every watch of a session, returning how many were removed.
    pub fn remove_session(&mut self, session: SessionId) -> usize {
        let before = self.watches.len();
        self.watches.retain(|_, entry| entry.session != session);
        before - self.watches.len()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    fn drop_closed(&mut self, closed: Vec<WatchId>) {
        if closed.is_empty() {
            return;
        }
        for id in &closed {
            self.watches.remove(id);
        }
        debug!("Cleaned up {} closed watch channels", closed.len());
    }
}
