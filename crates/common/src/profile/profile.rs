use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::store::VersionId;

use super::node::{FileNode, NodeId};

/// Structural violations of the profile's tree invariants
///
/// These are precondition failures: fatal for the operation that hit them,
/// never retried, and the trigger for process rollback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    #[error("node {0} not found in profile")]
    NodeNotFound(NodeId),
    #[error("node {0} already present in profile")]
    DuplicateNode(NodeId),
    #[error("parent {0} not found in profile")]
    ParentNotFound(NodeId),
    #[error("node {0} is not a folder")]
    NotAFolder(NodeId),
    #[error("folder {0} is not empty")]
    FolderNotEmpty(NodeId),
    #[error("the root folder cannot be removed")]
    RootImmutable,
}

/// The user's public identity document
///
/// Stored in the clear at a well-known content key at registration, so other
/// users can resolve a user id to a public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublicKey {
    pub user_id: String,
    pub public_key: PublicKey,
}

/// The shared document: one user's file tree plus per-node key rings
///
/// Owned collectively by all of a user's clients and physically located at a
/// single store key. Invariants:
///
/// - node ids are unique within a profile
/// - every non-root node has exactly one parent, and that parent is a folder
///   present in the profile
/// - a folder cannot be removed while it has children
///
/// A profile is only ever mutated inside a CAS update cycle driven by the
/// profile manager; `base_version` remembers which stored version this copy
/// was decoded from and never travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    user_id: String,
    identity: PublicKey,
    root: NodeId,
    nodes: BTreeMap<NodeId, FileNode>,
    #[serde(skip)]
    base_version: Option<VersionId>,
}

impl UserProfile {
    /// Create a fresh profile containing only a root folder.
    pub fn new(user_id: impl Into<String>, identity: PublicKey) -> Self {
        let root = FileNode::new_folder("/", None);
        let root_id = root.id();
        Self {
            user_id: user_id.into(),
            identity,
            root: root_id,
            nodes: BTreeMap::from([(root_id, root)]),
            base_version: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn identity(&self) -> &PublicKey {
        &self.identity
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes whose parent is `id`.
    pub fn children(&self, id: NodeId) -> Vec<&FileNode> {
        self.nodes
            .values()
            .filter(|n| n.parent() == Some(id))
            .collect()
    }

    /// Insert a node under its declared parent.
    ///
    /// # Errors
    ///
    /// - [`ProfileError::DuplicateNode`] if the id is already present
    /// - [`ProfileError::ParentNotFound`] if the node declares no parent or
    ///   a parent that is not in the profile
    /// - [`ProfileError::NotAFolder`] if the parent is a file
    pub fn insert_node(&mut self, node: FileNode) -> Result<(), ProfileError> {
        if self.nodes.contains_key(&node.id()) {
            return Err(ProfileError::DuplicateNode(node.id()));
        }
        let parent_id = node.parent().ok_or(ProfileError::ParentNotFound(node.id()))?;
        let parent = self
            .nodes
            .get(&parent_id)
            .ok_or(ProfileError::ParentNotFound(parent_id))?;
        if !parent.is_folder() {
            return Err(ProfileError::NotAFolder(parent_id));
        }
        self.nodes.insert(node.id(), node);
        Ok(())
    }

    /// Detach and return a node.
    ///
    /// # Errors
    ///
    /// - [`ProfileError::RootImmutable`] for the root folder
    /// - [`ProfileError::NodeNotFound`] if the id is absent
    /// - [`ProfileError::FolderNotEmpty`] for a folder that still has children
    pub fn remove_node(&mut self, id: NodeId) -> Result<FileNode, ProfileError> {
        if id == self.root {
            return Err(ProfileError::RootImmutable);
        }
        let node = self.nodes.get(&id).ok_or(ProfileError::NodeNotFound(id))?;
        if node.is_folder() && !self.children(id).is_empty() {
            return Err(ProfileError::FolderNotEmpty(id));
        }
        self.nodes.remove(&id).ok_or(ProfileError::NodeNotFound(id))
    }

    /// Re-insert a previously detached node under its original parent.
    ///
    /// This is the rollback path of a delete: the node still carries its
    /// parent id, so re-attaching is just an insert with the same checks.
    pub fn reattach(&mut self, node: FileNode) -> Result<(), ProfileError> {
        self.insert_node(node)
    }

    pub fn base_version(&self) -> Option<VersionId> {
        self.base_version
    }

    pub fn set_base_version(&mut self, version: Option<VersionId>) {
        self.base_version = version;
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    fn profile() -> UserProfile {
        UserProfile::new("alice", SecretKey::generate().public())
    }

    #[test]
    fn test_new_profile_has_only_root() {
        let profile = profile();
        assert_eq!(profile.node_count(), 1);
        assert!(profile.node(profile.root_id()).unwrap().is_folder());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut profile = profile();
        let folder = FileNode::new_folder("docs", Some(profile.root_id()));
        let folder_id = folder.id();

        profile.insert_node(folder).unwrap();
        assert_eq!(profile.children(profile.root_id()).len(), 1);

        let removed = profile.remove_node(folder_id).unwrap();
        assert_eq!(removed.id(), folder_id);
        assert_eq!(profile.node_count(), 1);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut profile = profile();
        let folder = FileNode::new_folder("docs", Some(profile.root_id()));

        profile.insert_node(folder.clone()).unwrap();
        let err = profile.insert_node(folder).unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateNode(_)));
    }

    #[test]
    fn test_insert_rejects_missing_parent() {
        let mut profile = profile();
        let orphan = FileNode::new_folder("orphan", Some(NodeId::generate()));
        let err = profile.insert_node(orphan).unwrap_err();
        assert!(matches!(err, ProfileError::ParentNotFound(_)));
    }

    #[test]
    fn test_insert_rejects_file_parent() {
        let mut profile = profile();
        let file = FileNode::new_file("report.txt", profile.root_id(), 10);
        let file_id = file.id();
        profile.insert_node(file).unwrap();

        let child = FileNode::new_folder("inside-a-file", Some(file_id));
        let err = profile.insert_node(child).unwrap_err();
        assert!(matches!(err, ProfileError::NotAFolder(_)));
    }

    #[test]
    fn test_remove_rejects_non_empty_folder() {
        let mut profile = profile();
        let folder = FileNode::new_folder("docs", Some(profile.root_id()));
        let folder_id = folder.id();
        profile.insert_node(folder).unwrap();
        profile
            .insert_node(FileNode::new_file("report.txt", folder_id, 10))
            .unwrap();

        let err = profile.remove_node(folder_id).unwrap_err();
        assert!(matches!(err, ProfileError::FolderNotEmpty(_)));
    }

    #[test]
    fn test_remove_rejects_root() {
        let mut profile = profile();
        let err = profile.remove_node(profile.root_id()).unwrap_err();
        assert!(matches!(err, ProfileError::RootImmutable));
    }

    #[test]
    fn test_reattach_restores_node() {
        let mut profile = profile();
        let folder = FileNode::new_folder("docs", Some(profile.root_id()));
        let folder_id = folder.id();
        profile.insert_node(folder).unwrap();

        let removed = profile.remove_node(folder_id).unwrap();
        profile.reattach(removed).unwrap();
        assert!(profile.node(folder_id).is_some());
    }

    #[test]
    fn test_base_version_does_not_serialize() {
        let mut profile = profile();
        profile.set_base_version(Some(VersionId::generate()));

        let decoded = UserProfile::decode(&profile.encode().unwrap()).unwrap();
        assert!(decoded.base_version().is_none());
        assert_eq!(decoded.user_id(), profile.user_id());
    }
}
