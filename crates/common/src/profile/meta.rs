use serde::{Deserialize, Serialize};

use super::node::{FileNode, NodeId};

/// Reference to a child node inside a folder's meta document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub id: NodeId,
    pub name: String,
}

impl From<&FileNode> for ChildRef {
    fn from(node: &FileNode) -> Self {
        Self {
            id: node.id(),
            name: node.name().to_string(),
        }
    }
}

/// A folder's meta document
///
/// Stored in the DHT under the folder's own key pair, encrypted to it, and
/// updated whenever a child is added or removed. The profile is the source of
/// truth for the tree shape; the meta document is what other users a folder
/// is shared with actually resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFolder {
    id: NodeId,
    name: String,
    children: Vec<ChildRef>,
}

impl MetaFolder {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[ChildRef] {
        &self.children
    }

    /// Add a child reference. Replaces an existing reference with the same id.
    pub fn add_child(&mut self, child: ChildRef) {
        self.remove_child(child.id);
        self.children.push(child);
    }

    /// Remove the child with the given id, returning it if it was present.
    pub fn remove_child(&mut self, id: NodeId) -> Option<ChildRef> {
        let position = self.children.iter().position(|c| c.id == id)?;
        Some(self.children.remove(position))
    }
}
