//! # Node Tree
//!
//! The hierarchical namespace kept by the in-memory service. This is focused
//! purely on node storage; sessions and watch dispatch live in the
//! coordinator.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use warden_core::path::{node_name, parent_path, validate_path};
use warden_core::{now_millis, CoordinationError, CreateMode, NodeMetadata, Result, SessionId};

/// A stored node with its metadata.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub creation_id: u64,
    pub payload: Bytes,
    pub version: u64,
    pub ephemeral_owner: Option<SessionId>,
    pub created_at: u64,
    pub modified_at: u64,
    pub children: BTreeSet<String>,
}

impl NodeEntry {
    fn new(creation_id: u64, payload: Bytes, ephemeral_owner: Option<SessionId>) -> Self {
        let now = now_millis();
        Self {
            creation_id,
            payload,
            version: 0,
            ephemeral_owner,
            created_at: now,
            modified_at: now,
            children: BTreeSet::new(),
        }
    }

    pub fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            creation_id: self.creation_id,
            version: self.version,
            ephemeral_owner: self.ephemeral_owner,
            created_at: self.created_at,
            modified_at: self.modified_at,
            data_length: self.payload.len(),
            num_children: self.children.len(),
        }
    }
}

/// Hierarchical node storage rooted at `/`.
#[derive(Debug)]
pub struct NodeTree {
    nodes: BTreeMap<String, NodeEntry>,
    last_creation_id: u64,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), NodeEntry::new(0, Bytes::new(), None));
        Self {
            nodes,
            last_creation_id: 0,
        }
    }

    pub fn get(&self, path: &str) -> Option<&NodeEntry> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a node whose parent must already exist.
    pub fn create(
        &mut self,
        path: &str,
        payload: Bytes,
        mode: CreateMode,
        owner: SessionId,
    ) -> Result<&NodeEntry> {
        validate_path(path)?;
        if path == "/" || self.nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists {
                path: path.to_string(),
            });
        }
        let parent = parent_path(path).unwrap_or("/");
        match self.nodes.get(parent) {
            None => {
                return Err(CoordinationError::NoNode {
                    path: parent.to_string(),
                })
            }
            Some(entry) if entry.ephemeral_owner.is_some() => {
                return Err(CoordinationError::NoChildrenForEphemerals {
                    path: parent.to_string(),
                })
            }
            Some(_) => {}
        }

        let ephemeral_owner = mode.is_ephemeral().then_some(owner);
        self.last_creation_id += 1;
        let creation_id = self.last_creation_id;
        if let Some(parent_entry) = self.nodes.get_mut(parent) {
            parent_entry.children.insert(node_name(path).to_string());
        }
        self.nodes
            .insert(path.to_string(), NodeEntry::new(creation_id, payload, ephemeral_owner));
        self.nodes
            .get(path)
            .ok_or_else(|| CoordinationError::internal("node vanished after insert"))
    }

    pub fn set_data(&mut self, path: &str, payload: Bytes) -> Result<&NodeEntry> {
        let entry = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode {
                path: path.to_string(),
            })?;
        entry.payload = payload;
        entry.version += 1;
        entry.modified_at = now_millis();
        Ok(entry)
    }

    /// Remove a childless node, returning it.
    pub fn delete(&mut self, path: &str) -> Result<NodeEntry> {
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::invalid_path(path, "cannot delete the root"));
        }
        match self.nodes.get(path) {
            None => {
                return Err(CoordinationError::NoNode {
                    path: path.to_string(),
                })
            }
            Some(entry) if !entry.children.is_empty() => {
                return Err(CoordinationError::NotEmpty {
                    path: path.to_string(),
                })
            }
            Some(_) => {}
        }
        let removed = self
            .nodes
            .remove(path)
            .ok_or_else(|| CoordinationError::internal("node vanished before delete"))?;
        if let Some(parent) = parent_path(path) {
            if let Some(parent_entry) = self.nodes.get_mut(parent) {
                parent_entry.children.remove(node_name(path));
            }
        }
        Ok(removed)
    }

    /// Full paths of the direct children of `path`.
    pub fn child_paths(&self, path: &str) -> Vec<String> {
        match self.nodes.get(path) {
            Some(entry) => entry
                .children
                .iter()
                .map(|name| warden_core::path::join_path(path, name))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: SessionId = SessionId(1);

    #[test]
    fn test_create_and_delete() {
        let mut tree = NodeTree::new();
        tree.create("/a", Bytes::from("x"), CreateMode::Persistent, OWNER)
            .unwrap();
        tree.create("/a/b", Bytes::new(), CreateMode::Ephemeral, OWNER)
            .unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("/a").unwrap().metadata().num_children, 1);
        assert_eq!(tree.get("/a/b").unwrap().ephemeral_owner, Some(OWNER));

        assert!(matches!(
            tree.delete("/a"),
            Err(CoordinationError::NotEmpty { .. })
        ));
        let first = tree.delete("/a/b").unwrap().creation_id;
        let again = tree
            .create("/a/b", Bytes::new(), CreateMode::Ephemeral, OWNER)
            .unwrap()
            .creation_id;
        assert!(again > first);
        tree.delete("/a/b").unwrap();
        tree.delete("/a").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_create_errors() {
        let mut tree = NodeTree::new();
        assert!(matches!(
            tree.create("/a/b", Bytes::new(), CreateMode::Persistent, OWNER),
            Err(CoordinationError::NoNode { .. })
        ));
        tree.create("/e", Bytes::new(), CreateMode::Ephemeral, OWNER)
            .unwrap();
        assert!(matches!(
            tree.create("/e", Bytes::new(), CreateMode::Ephemeral, OWNER),
            Err(CoordinationError::NodeExists { .. })
        ));
        assert!(matches!(
            tree.create("/e/child", Bytes::new(), CreateMode::Persistent, OWNER),
            Err(CoordinationError::NoChildrenForEphemerals { .. })
        ));
    }

    #[test]
    fn test_set_data_bumps_version() {
        let mut tree = NodeTree::new();
        tree.create("/c", Bytes::from("0"), CreateMode::Persistent, OWNER)
            .unwrap();
        let entry = tree.set_data("/c", Bytes::from("100")).unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.payload, Bytes::from("100"));
        assert_eq!(tree.child_paths("/"), vec!["/c".to_string()]);
    }
}
