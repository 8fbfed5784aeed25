use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::SecretKey;

/// Unique identifier of a node within a user profile
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// A file with its plaintext size in bytes.
    File { size: u64 },
    /// A folder; children are the nodes whose `parent` is this node.
    Folder,
}

/// One node of the user's file tree
///
/// A node carries its own key pair (locating and encrypting the node's meta
/// document in the store) and a protection key pair (authorizing writes to
/// those documents). Both travel only inside the encrypted profile, which is
/// how every client of the same user ends up holding the same key ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    id: NodeId,
    name: String,
    /// `None` only for the profile's root folder.
    parent: Option<NodeId>,
    kind: NodeKind,
    keys: SecretKey,
    protection: SecretKey,
}

impl FileNode {
    /// Create a folder node with a fresh key ring.
    pub fn new_folder(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            parent,
            kind: NodeKind::Folder,
            keys: SecretKey::generate(),
            protection: SecretKey::generate(),
        }
    }

    /// Create a file node with a fresh key ring.
    pub fn new_file(name: impl Into<String>, parent: NodeId, size: u64) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            parent: Some(parent),
            kind: NodeKind::File { size },
            keys: SecretKey::generate(),
            protection: SecretKey::generate(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    /// The node's own key pair (meta document location + encryption).
    pub fn keys(&self) -> &SecretKey {
        &self.keys
    }

    /// The protection key pair authorizing writes under this node.
    pub fn protection(&self) -> &SecretKey {
        &self.protection
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_folder_node() {
        let node = FileNode::new_folder("docs", None);
        assert!(node.is_folder());
        assert!(node.parent().is_none());
        assert_eq!(node.name(), "docs");
    }

    #[test]
    fn test_file_node() {
        let parent = NodeId::generate();
        let node = FileNode::new_file("report.txt", parent, 1024);
        assert!(!node.is_folder());
        assert_eq!(node.parent(), Some(parent));
        assert_eq!(node.kind(), &NodeKind::File { size: 1024 });
    }

    #[test]
    fn test_nodes_get_distinct_keys() {
        let a = FileNode::new_folder("a", None);
        let b = FileNode::new_folder("b", None);
        assert_ne!(a.keys().to_bytes(), b.keys().to_bytes());
        assert_ne!(a.keys().to_bytes(), a.protection().to_bytes());
    }

    #[test]
    fn test_node_serde_roundtrip() {
        let node = FileNode::new_file("report.txt", NodeId::generate(), 42);
        let bytes = bincode::serialize(&node).unwrap();
        let decoded: FileNode = bincode::deserialize(&bytes).unwrap();
        assert_eq!(node, decoded);
    }
}
