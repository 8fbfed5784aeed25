//! Delete a file or empty folder
//!
//! The shape follows the data: first a CAS update cycle detaches the node
//! from the profile (caching it locally for rollback), then - unless the
//! node sat directly in the root - the parent folder's meta document is
//! fetched, stripped of the child reference, and put back. The user's other
//! clients get a best-effort notification on the way out.
//!
//! Rollback runs the same path in reverse: restore the parent meta document
//! if it was rewritten, then re-attach the cached node to the profile via a
//! fresh CAS cycle.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::SecretKey;
use crate::notify::ClientEvent;
use crate::process::{
    ExecutionError, Process, ProcessCtx, ProcessStep, RollbackError, RollbackReason, StepOutcome,
};
use crate::profile::{ChildRef, FileNode, MetaFolder, NodeId, ProfileError, ProfileManager};
use crate::store::{content_keys, StoreAddr, StoreOps, VersionId};

/// The parent folder's key ring, captured while the profile was in hand
#[derive(Clone)]
pub struct ParentInfo {
    pub id: NodeId,
    pub keys: SecretKey,
    pub protection: SecretKey,
}

/// The parent meta document as fetched, with the version to CAS against
pub struct FetchedMeta {
    pub meta: MetaFolder,
    pub version: VersionId,
}

/// Scratch space shared by the delete steps
///
/// `deleted`, `parent`, and `parent_meta` are the explicit contract between
/// step pairs: the detach step populates the first two, the get step the
/// third, the update step consumes all of them.
pub struct DeleteFileContext {
    pub manager: Arc<ProfileManager>,
    pub ops: StoreOps,
    pub target: NodeId,
    pub deleted: Option<FileNode>,
    pub parent: Option<ParentInfo>,
    pub parent_meta: Option<FetchedMeta>,
}

/// Build a ready-to-start delete process for one node.
pub fn delete_process(
    manager: Arc<ProfileManager>,
    ops: StoreOps,
    target: NodeId,
) -> Process<DeleteFileContext> {
    let context = DeleteFileContext {
        manager,
        ops,
        target,
        deleted: None,
        parent: None,
        parent_meta: None,
    };
    let mut process = Process::new("delete-file", context);
    process.add_step(DetachNodeStep::default());
    process.add_step(GetParentMetaStep);
    process.add_step(UpdateParentMetaStep::default());
    process
}

/// Detaches the target node from the profile via a CAS update cycle.
///
/// Caches the detached node locally; that cached pre-state is all the
/// rollback needs to undo the durable effect. If the node sat directly in
/// the root there is no parent meta document to update, so the step notifies
/// and finishes the process early.
#[derive(Default)]
struct DetachNodeStep {
    detached: Option<FileNode>,
}

#[async_trait]
impl ProcessStep<DeleteFileContext> for DetachNodeStep {
    fn name(&self) -> &str {
        "detach-node"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<DeleteFileContext>,
    ) -> Result<StepOutcome<DeleteFileContext>, ExecutionError> {
        let manager = ctx.manager.clone();
        let target = ctx.target;

        let mut removed: Option<FileNode> = None;
        let mut parent: Option<ParentInfo> = None;
        let mut parent_is_root = false;

        manager
            .update(|profile| {
                // The cycle may retry against a fresh base; recompute
                // everything from the profile in hand
                removed = None;
                parent = None;
                parent_is_root = false;

                let node = profile.remove_node(target)?;
                if let Some(parent_id) = node.parent() {
                    let parent_node = profile
                        .node(parent_id)
                        .ok_or(ProfileError::ParentNotFound(parent_id))?;
                    parent_is_root = parent_id == profile.root_id();
                    parent = Some(ParentInfo {
                        id: parent_id,
                        keys: parent_node.keys().clone(),
                        protection: parent_node.protection().clone(),
                    });
                }
                removed = Some(node);
                Ok(())
            })
            .await?;

        let node = removed.ok_or_else(|| {
            ExecutionError::Invalid("delete mutation did not run".to_string())
        })?;
        tracing::info!("detached '{}' from the profile", node.name());

        let name = node.name().to_string();
        self.detached = Some(node.clone());
        ctx.deleted = Some(node);
        ctx.parent = parent;

        if parent_is_root {
            // No parent meta document to update for nodes sitting in root
            tracing::debug!("'{}' sat in root; skipping parent meta update", name);
            ctx.notify_other_clients(ClientEvent::FileDeleted { name });
            Ok(StepOutcome::Finish)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    async fn rollback(
        &mut self,
        ctx: &mut ProcessCtx<DeleteFileContext>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        let node = match self.detached.take() {
            Some(node) => node,
            None => return Ok(()),
        };

        let manager = ctx.manager.clone();
        let result = manager
            .update(|profile| match profile.reattach(node.clone()) {
                // Already present again (e.g. another client restored it)
                Err(ProfileError::DuplicateNode(_)) => Ok(()),
                other => other,
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!("re-attached '{}' to the profile", node.name());
                Ok(())
            }
            Err(error) => Err(RollbackError::new(self.name(), error)),
        }
    }
}

/// Fetches and decrypts the parent folder's meta document.
///
/// Pure read: nothing durable happens here, so the default no-op rollback is
/// the correct one.
struct GetParentMetaStep;

#[async_trait]
impl ProcessStep<DeleteFileContext> for GetParentMetaStep {
    fn name(&self) -> &str {
        "get-parent-meta"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<DeleteFileContext>,
    ) -> Result<StepOutcome<DeleteFileContext>, ExecutionError> {
        let parent = ctx
            .parent
            .clone()
            .ok_or_else(|| ExecutionError::Invalid("parent info missing from context".to_string()))?;

        let addr = StoreAddr::from(&parent.keys.public());
        let plaintext = ctx
            .ops
            .get_decrypted(&addr, content_keys::META_FOLDER, &parent.keys)
            .await?
            .ok_or_else(|| {
                ExecutionError::Invalid("parent meta folder not found".to_string())
            })?;

        let meta: MetaFolder = bincode::deserialize(&plaintext.payload)?;
        tracing::debug!(
            "fetched parent meta folder '{}' at version {}",
            meta.name(),
            plaintext.version
        );

        ctx.parent_meta = Some(FetchedMeta {
            meta,
            version: plaintext.version,
        });
        Ok(StepOutcome::Continue)
    }
}

/// Rewrites the parent meta document without the deleted child.
#[derive(Default)]
struct UpdateParentMetaStep {
    committed: Option<Committed>,
}

struct Committed {
    meta: MetaFolder,
    version: VersionId,
    child: ChildRef,
}

#[async_trait]
impl ProcessStep<DeleteFileContext> for UpdateParentMetaStep {
    fn name(&self) -> &str {
        "update-parent-meta"
    }

    async fn execute(
        &mut self,
        ctx: &mut ProcessCtx<DeleteFileContext>,
    ) -> Result<StepOutcome<DeleteFileContext>, ExecutionError> {
        let parent = ctx
            .parent
            .clone()
            .ok_or_else(|| ExecutionError::Invalid("parent info missing from context".to_string()))?;
        let deleted = ctx
            .deleted
            .clone()
            .ok_or_else(|| ExecutionError::Invalid("deleted node missing from context".to_string()))?;
        let fetched = ctx.parent_meta.take().ok_or_else(|| {
            ExecutionError::Invalid("parent meta missing from context".to_string())
        })?;

        let mut meta = fetched.meta;
        if meta.remove_child(deleted.id()).is_none() {
            tracing::warn!(
                "child '{}' was not referenced in the parent meta folder",
                deleted.name()
            );
        }

        let payload = bincode::serialize(&meta)?;
        let addr = StoreAddr::from(&parent.keys.public());
        let version = ctx
            .ops
            .put_encrypted(
                &addr,
                content_keys::META_FOLDER,
                &payload,
                Some(fetched.version),
                &parent.keys.public(),
                &parent.protection,
            )
            .await?;

        self.committed = Some(Committed {
            meta,
            version,
            child: ChildRef::from(&deleted),
        });

        ctx.notify_other_clients(ClientEvent::FileDeleted {
            name: deleted.name().to_string(),
        });
        Ok(StepOutcome::Continue)
    }

    async fn rollback(
        &mut self,
        ctx: &mut ProcessCtx<DeleteFileContext>,
        _reason: &RollbackReason,
    ) -> Result<(), RollbackError> {
        let committed = match self.committed.take() {
            Some(committed) => committed,
            None => return Ok(()),
        };

        let parent = ctx.parent.clone().ok_or_else(|| {
            RollbackError::new(self.name(), "parent info missing from context")
        })?;

        let mut meta = committed.meta;
        meta.add_child(committed.child);
        let payload =
            bincode::serialize(&meta).map_err(|error| RollbackError::new(self.name(), error))?;

        let addr = StoreAddr::from(&parent.keys.public());
        ctx.ops
            .put_encrypted(
                &addr,
                content_keys::META_FOLDER,
                &payload,
                Some(committed.version),
                &parent.keys.public(),
                &parent.protection,
            )
            .await
            .map_err(|error| RollbackError::new(self.name(), error))?;

        Ok(())
    }
}
