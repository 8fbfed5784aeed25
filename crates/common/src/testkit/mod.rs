/// Lightweight test harness for multi-client integration tests
///
/// This module provides a simple way to create several clients of the same
/// user sharing one in-memory store, without requiring external
/// infrastructure. Clients of the same user derive the same profile and
/// protection keys deterministically from the user id, the way real clients
/// share a key ring through credentials.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestClient;
/// use common::store::MemoryStore;
///
/// #[tokio::test]
/// async fn test_two_clients() -> anyhow::Result<()> {
///     let store = MemoryStore::new();
///
///     // Two clients of the same user, same key ring, same store
///     let desktop = TestClient::new(&store, "alice");
///     let laptop = TestClient::new(&store, "alice");
///
///     desktop.register().await?;
///     let profile = laptop.manager.get_profile(false).await?;
///     assert_eq!(profile.user_id(), "alice");
///     Ok(())
/// }
/// ```
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::crypto::SecretKey;
use crate::ops::register_process;
use crate::process::{ProcessListener, RollbackReason, Terminal};
use crate::profile::{
    ChildRef, FileNode, ManagerConfig, MetaFolder, NodeId, ProfileManager, UserProfile,
};
use crate::store::{content_keys, MemoryStore, StoreAddr, StoreOps};

/// One client of a user, wired against a shared in-memory store
pub struct TestClient {
    pub store: MemoryStore,
    pub ops: StoreOps,
    pub manager: Arc<ProfileManager>,
    pub identity: SecretKey,
    pub user_id: String,
}

impl TestClient {
    pub fn new(store: &MemoryStore, user_id: &str) -> Self {
        Self::with_config(store, user_id, ManagerConfig::default())
    }

    pub fn with_config(store: &MemoryStore, user_id: &str, config: ManagerConfig) -> Self {
        let ops = StoreOps::new(Arc::new(store.clone()), Duration::from_secs(2));
        let manager = Arc::new(ProfileManager::new(
            ops.clone(),
            user_id,
            derive_key(user_id, "profile"),
            derive_key(user_id, "protection"),
            config,
        ));
        Self {
            store: store.clone(),
            ops,
            manager,
            identity: SecretKey::generate(),
            user_id: user_id.to_string(),
        }
    }

    /// Run the registration process to completion.
    pub async fn register(&self) -> anyhow::Result<Terminal> {
        let process = register_process(
            self.manager.clone(),
            self.ops.clone(),
            &self.user_id,
            self.identity.clone(),
        );
        let handle = process.start();
        Ok(handle.join().await?)
    }
}

/// Every client of the same user must hold the same profile and protection
/// secrets; derive them from the user id so the harness needs no key
/// distribution.
fn derive_key(user_id: &str, domain: &str) -> SecretKey {
    let digest = blake3::hash(format!("{}:{}", user_id, domain).as_bytes());
    SecretKey::from(*digest.as_bytes())
}

/// Handles into a profile seeded with `/docs/old/` plus the parent meta
/// document in the store
pub struct SeededTree {
    pub parent: NodeId,
    pub leaf: NodeId,
    pub parent_keys: SecretKey,
    pub parent_protection: SecretKey,
}

/// Create a profile shaped `/docs/old/` for the client's user, with the
/// `docs` folder's meta document present in the store.
pub async fn seed_tree(client: &TestClient) -> anyhow::Result<SeededTree> {
    let mut profile = UserProfile::new(&client.user_id, client.identity.public());
    let root = profile.root_id();

    let parent = FileNode::new_folder("docs", Some(root));
    let parent_id = parent.id();
    let parent_keys = parent.keys().clone();
    let parent_protection = parent.protection().clone();

    let leaf = FileNode::new_folder("old", Some(parent_id));
    let leaf_id = leaf.id();

    let mut meta = MetaFolder::new(parent_id, "docs");
    meta.add_child(ChildRef::from(&leaf));

    profile.insert_node(parent)?;
    profile.insert_node(leaf)?;
    client.manager.create(&profile).await?;

    client
        .ops
        .put_encrypted(
            &StoreAddr::from(&parent_keys.public()),
            content_keys::META_FOLDER,
            &bincode::serialize(&meta)?,
            None,
            &parent_keys.public(),
            &parent_protection,
        )
        .await?;

    Ok(SeededTree {
        parent: parent_id,
        leaf: leaf_id,
        parent_keys,
        parent_protection,
    })
}

/// Listener that records terminal callbacks, for asserting on notification
/// order and exactly-once delivery
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ProcessListener for RecordingListener {
    fn on_succeeded(&self) {
        self.events.lock().push("succeeded".to_string());
    }

    fn on_failed(&self, reason: &RollbackReason) {
        self.events.lock().push(format!("failed: {}", reason));
    }

    fn on_rolled_back(&self, reason: &RollbackReason) {
        self.events.lock().push(format!("rolled-back: {}", reason));
    }
}
