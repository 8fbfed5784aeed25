//! # Profile
//!
//! The shared document and its optimistic-concurrency gateway:
//!
//! - [`UserProfile`] - one user's file tree plus per-node key rings, the
//!   single document all of a user's clients read-modify-write
//! - [`FileNode`] / [`NodeId`] - the tree's building blocks
//! - [`MetaFolder`] - a folder's per-node meta document in the store
//! - [`ProfileManager`] - the CAS retry protocol: local serialization,
//!   fetch-fresh, mutate, bounded retry

mod manager;
mod meta;
mod node;
#[allow(clippy::module_inception)]
mod profile;

pub use manager::{GetError, ManagerConfig, ProfileManager, PutError};
pub use meta::{ChildRef, MetaFolder};
pub use node::{FileNode, NodeId, NodeKind};
pub use profile::{ProfileError, UserProfile, UserPublicKey};
