//! The optimistic-concurrency profile store
//!
//! A `ProfileManager` turns the raw CAS-guarded store into a linearizable
//! "read the latest profile, propose a new one" operation:
//!
//! 1. **Local serialization** - one manager exists per user within a client,
//!    and its async mutex admits one update cycle at a time; concurrent local
//!    callers queue instead of racing each other's fetch/put pairs.
//! 2. **Fetch fresh** - every cycle starts from the store's current version,
//!    never from a cached copy.
//! 3. **Mutate** - the caller's closure is applied to the fetched copy. The
//!    closure IS the conflict-resolution policy: on a retry it recomputes the
//!    intended change against the new base, and if the change no longer
//!    applies it fails with a precondition error and the cycle aborts.
//!    No silent last-writer-wins.
//! 4. **CAS put** - a new [`VersionedContent`](crate::store::VersionedContent)
//!    based on the fetched version is proposed; if a remote writer won the
//!    race the store rejects it and the cycle re-fetches and retries.
//! 5. **Bounded retry** - contention past the attempt ceiling surfaces as
//!    [`PutError::RetriesExhausted`], never an indefinite stall.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::crypto::{PublicKey, SecretKey};
use crate::store::{content_keys, OpsError, StoreAddr, StoreError, StoreOps, VersionId};

use super::profile::{ProfileError, UserProfile};

/// Errors fetching the profile
#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("profile not found for user '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Ops(#[from] OpsError),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors proposing a new profile
#[derive(Debug, thiserror::Error)]
pub enum PutError {
    /// Sustained contention: every attempt lost the CAS race.
    #[error("profile update failed after {attempts} attempts under contention")]
    RetriesExhausted { attempts: u32 },
    /// The caller's change no longer applies against the current base.
    #[error("precondition failed: {0}")]
    Precondition(#[from] ProfileError),
    #[error(transparent)]
    Get(#[from] GetError),
    #[error(transparent)]
    Ops(#[from] OpsError),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Tunables for the update protocol
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Attempt ceiling for one update cycle.
    pub max_put_attempts: u32,
    /// How long a cached profile may serve `use_cache` reads.
    pub cache_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_put_attempts: 5,
            cache_ttl: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedProfile {
    profile: UserProfile,
    fetched_at: Instant,
}

/// Per-user gateway to the shared profile document
///
/// One instance per user per client; share it (`Arc`) across every process
/// that touches the same profile, or the local serialization guarantee is
/// lost.
#[derive(Debug)]
pub struct ProfileManager {
    ops: StoreOps,
    user_id: String,
    addr: StoreAddr,
    profile_keys: SecretKey,
    protection: SecretKey,
    config: ManagerConfig,
    update_lock: AsyncMutex<()>,
    cache: Mutex<Option<CachedProfile>>,
}

impl ProfileManager {
    pub fn new(
        ops: StoreOps,
        user_id: impl Into<String>,
        profile_keys: SecretKey,
        protection: SecretKey,
        config: ManagerConfig,
    ) -> Self {
        let user_id = user_id.into();
        let addr = StoreAddr::from_user_id(&user_id);
        Self {
            ops,
            user_id,
            addr,
            profile_keys,
            protection,
            config,
            update_lock: AsyncMutex::new(()),
            cache: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The store address the profile lives at.
    pub fn addr(&self) -> StoreAddr {
        self.addr
    }

    /// The public key the profile is encrypted to.
    pub fn profile_public(&self) -> PublicKey {
        self.profile_keys.public()
    }

    /// The protection key pair authorizing profile writes.
    pub fn protection(&self) -> &SecretKey {
        &self.protection
    }

    /// Fetch and decrypt the latest profile, if one exists.
    ///
    /// `use_cache = true` may serve a recently fetched copy (within the
    /// configured TTL) - fine for reads that only check existence, never
    /// fine before an update cycle. `use_cache = false` always hits the
    /// store.
    pub async fn try_get_profile(&self, use_cache: bool) -> Result<Option<UserProfile>, GetError> {
        if use_cache {
            if let Some(cached) = self.cache.lock().as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    tracing::debug!("serving cached profile for '{}'", self.user_id);
                    return Ok(Some(cached.profile.clone()));
                }
            }
        }
        self.fetch_fresh().await
    }

    /// Like [`try_get_profile`](Self::try_get_profile) but absence is an error.
    pub async fn get_profile(&self, use_cache: bool) -> Result<UserProfile, GetError> {
        self.try_get_profile(use_cache)
            .await?
            .ok_or_else(|| GetError::NotFound(self.user_id.clone()))
    }

    /// Put the very first version of the profile.
    pub async fn create(&self, profile: &UserProfile) -> Result<VersionId, PutError> {
        let _cycle = self.update_lock.lock().await;

        let payload = profile.encode()?;
        let version = self
            .ops
            .put_encrypted(
                &self.addr,
                content_keys::USER_PROFILE,
                &payload,
                None,
                &self.profile_keys.public(),
                &self.protection,
            )
            .await?;

        let mut created = profile.clone();
        created.set_base_version(Some(version));
        self.store_cache(created);

        tracing::info!("created profile for '{}' at version {}", self.user_id, version);
        Ok(version)
    }

    /// Run one full read-modify-write cycle against the latest profile.
    ///
    /// The mutation closure may be invoked several times - once per attempt,
    /// each time against a freshly fetched copy. It must be idempotent in
    /// intent: recompute the change from the profile it is handed, not from
    /// state accumulated across invocations.
    pub async fn update<F>(&self, mut mutate: F) -> Result<VersionId, PutError>
    where
        F: FnMut(&mut UserProfile) -> Result<(), ProfileError> + Send,
    {
        let _cycle = self.update_lock.lock().await;

        let mut attempts = 0;
        while attempts < self.config.max_put_attempts {
            attempts += 1;

            let mut profile = self
                .fetch_fresh()
                .await
                .map_err(PutError::Get)?
                .ok_or_else(|| GetError::NotFound(self.user_id.clone()))
                .map_err(PutError::Get)?;
            let base = profile.base_version();

            mutate(&mut profile)?;

            let payload = profile.encode()?;
            match self
                .ops
                .put_encrypted(
                    &self.addr,
                    content_keys::USER_PROFILE,
                    &payload,
                    base,
                    &self.profile_keys.public(),
                    &self.protection,
                )
                .await
            {
                Ok(version) => {
                    profile.set_base_version(Some(version));
                    self.store_cache(profile);
                    tracing::debug!(
                        "updated profile for '{}' to version {} (attempt {})",
                        self.user_id,
                        version,
                        attempts
                    );
                    return Ok(version);
                }
                Err(OpsError::Store(StoreError::VersionConflict { found, .. })) => {
                    tracing::warn!(
                        "concurrent writer moved '{}' profile to {:?}, retrying ({}/{})",
                        self.user_id,
                        found,
                        attempts,
                        self.config.max_put_attempts
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PutError::RetriesExhausted { attempts })
    }

    async fn fetch_fresh(&self) -> Result<Option<UserProfile>, GetError> {
        let plaintext = self
            .ops
            .get_decrypted(&self.addr, content_keys::USER_PROFILE, &self.profile_keys)
            .await?;

        match plaintext {
            None => Ok(None),
            Some(plaintext) => {
                let mut profile = UserProfile::decode(&plaintext.payload)?;
                profile.set_base_version(Some(plaintext.version));
                self.store_cache(profile.clone());
                Ok(Some(profile))
            }
        }
    }

    fn store_cache(&self, profile: UserProfile) {
        *self.cache.lock() = Some(CachedProfile {
            profile,
            fetched_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::store::MemoryStore;

    use std::sync::Arc;

    fn manager(store: &MemoryStore) -> ProfileManager {
        ProfileManager::new(
            StoreOps::new(Arc::new(store.clone()), Duration::from_secs(1)),
            "alice",
            SecretKey::generate(),
            SecretKey::generate(),
            ManagerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_get_before_create_is_absent() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        assert!(manager.try_get_profile(false).await.unwrap().is_none());
        assert!(matches!(
            manager.get_profile(false).await.unwrap_err(),
            GetError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        let profile = UserProfile::new("alice", SecretKey::generate().public());
        let version = manager.create(&profile).await.unwrap();

        let fetched = manager.get_profile(false).await.unwrap();
        assert_eq!(fetched.user_id(), "alice");
        assert_eq!(fetched.base_version(), Some(version));
    }

    #[tokio::test]
    async fn test_cached_read_skips_the_store() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        let profile = UserProfile::new("alice", SecretKey::generate().public());
        manager.create(&profile).await.unwrap();

        let gets_before = store
            .op_log()
            .iter()
            .filter(|op| op.kind == crate::store::OpKind::Get)
            .count();

        manager.get_profile(true).await.unwrap();
        let gets_after = store
            .op_log()
            .iter()
            .filter(|op| op.kind == crate::store::OpKind::Get)
            .count();
        assert_eq!(gets_before, gets_after);

        // An uncached read goes to the store
        manager.get_profile(false).await.unwrap();
        let gets_final = store
            .op_log()
            .iter()
            .filter(|op| op.kind == crate::store::OpKind::Get)
            .count();
        assert_eq!(gets_final, gets_after + 1);
    }

    #[tokio::test]
    async fn test_update_applies_mutation() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        let identity = SecretKey::generate().public();
        manager
            .create(&UserProfile::new("alice", identity))
            .await
            .unwrap();

        manager
            .update(|profile| {
                let folder =
                    crate::profile::FileNode::new_folder("docs", Some(profile.root_id()));
                profile.insert_node(folder)
            })
            .await
            .unwrap();

        let fetched = manager.get_profile(false).await.unwrap();
        assert_eq!(fetched.node_count(), 2);
    }

    #[tokio::test]
    async fn test_precondition_failure_aborts_without_retry() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        manager
            .create(&UserProfile::new("alice", SecretKey::generate().public()))
            .await
            .unwrap();

        let mut invocations = 0;
        let err = manager
            .update(|profile| {
                invocations += 1;
                let root = profile.root_id();
                profile.remove_node(root).map(|_| ())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PutError::Precondition(ProfileError::RootImmutable)
        ));
        assert_eq!(invocations, 1);
    }
}
