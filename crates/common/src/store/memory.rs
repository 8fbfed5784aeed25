//! In-memory store backend
//!
//! Honors the full [`StoreClient`] contract - CAS guard, write protection,
//! absence as a value - while running entirely in-process. Every operation is
//! resolved on a separately spawned "network" task and handed back to the
//! caller through a one-shot channel, the same shape a real DHT client's
//! completion callbacks take, so the code above it cannot tell the
//! difference.
//!
//! Tests can script faults against specific keys and inspect the raw
//! operation log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::crypto::{PublicKey, SecretKey};

use super::client::{StoreAddr, StoreClient, StoreError};
use super::content::{VersionId, VersionedContent};

/// The kind of store operation, for op logs and fault matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Put,
    Remove,
}

/// One executed operation, in store-side execution order
#[derive(Debug, Clone)]
pub struct OpRecord {
    pub kind: OpKind,
    pub addr: StoreAddr,
    pub content_key: String,
}

#[derive(Debug)]
struct Fault {
    kind: OpKind,
    addr: StoreAddr,
    content_key: String,
    error: StoreError,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    content: VersionedContent,
    protection: PublicKey,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<HashMap<(StoreAddr, String), StoredEntry>>,
    faults: Mutex<Vec<Fault>>,
    ops: Mutex<Vec<OpRecord>>,
    latency: Duration,
}

/// In-memory implementation of [`StoreClient`]
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Create a store whose network tasks sleep before resolving.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                faults: Mutex::new(Vec::new()),
                ops: Mutex::new(Vec::new()),
                latency,
            }),
        }
    }

    /// Script the next matching operation on `(addr, content_key)` to fail.
    ///
    /// Faults are consumed in the order they were scripted; call repeatedly
    /// to fail several consecutive operations.
    pub fn fail_next(&self, kind: OpKind, addr: &StoreAddr, content_key: &str, error: StoreError) {
        self.inner.faults.lock().push(Fault {
            kind,
            addr: *addr,
            content_key: content_key.to_string(),
            error,
        });
    }

    /// The raw operation log, in store-side execution order.
    pub fn op_log(&self) -> Vec<OpRecord> {
        self.inner.ops.lock().clone()
    }

    /// The content currently stored under a key, bypassing the network path.
    pub fn current(&self, addr: &StoreAddr, content_key: &str) -> Option<VersionedContent> {
        self.inner
            .entries
            .lock()
            .get(&(*addr, content_key.to_string()))
            .map(|e| e.content.clone())
    }

    /// The version currently stored under a key, bypassing the network path.
    pub fn current_version(&self, addr: &StoreAddr, content_key: &str) -> Option<VersionId> {
        self.current(addr, content_key).map(|c| c.version())
    }

    /// Write an entry directly, bypassing the network path and the CAS guard.
    ///
    /// Simulates a remote client winning a race from outside this process.
    pub fn overwrite(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        content: VersionedContent,
        protection: &PublicKey,
    ) {
        self.inner.entries.lock().insert(
            (*addr, content_key.to_string()),
            StoredEntry {
                content,
                protection: *protection,
            },
        );
    }
}

impl Inner {
    fn take_fault(&self, kind: OpKind, addr: &StoreAddr, content_key: &str) -> Option<StoreError> {
        let mut faults = self.faults.lock();
        let position = faults
            .iter()
            .position(|f| f.kind == kind && f.addr == *addr && f.content_key == content_key)?;
        Some(faults.remove(position).error)
    }

    fn record(&self, kind: OpKind, addr: &StoreAddr, content_key: &str) {
        self.ops.lock().push(OpRecord {
            kind,
            addr: *addr,
            content_key: content_key.to_string(),
        });
    }

    fn apply_get(
        &self,
        addr: StoreAddr,
        content_key: &str,
    ) -> Result<Option<VersionedContent>, StoreError> {
        self.record(OpKind::Get, &addr, content_key);
        if let Some(error) = self.take_fault(OpKind::Get, &addr, content_key) {
            return Err(error);
        }
        Ok(self
            .entries
            .lock()
            .get(&(addr, content_key.to_string()))
            .map(|e| e.content.clone()))
    }

    fn apply_put(
        &self,
        addr: StoreAddr,
        content_key: &str,
        content: VersionedContent,
        protection: PublicKey,
    ) -> Result<(), StoreError> {
        self.record(OpKind::Put, &addr, content_key);
        if let Some(error) = self.take_fault(OpKind::Put, &addr, content_key) {
            return Err(error);
        }

        let mut entries = self.entries.lock();
        let key = (addr, content_key.to_string());
        let existing = entries
            .get(&key)
            .map(|entry| (entry.protection, entry.content.version()));
        match existing {
            None => {
                if content.based_on_version().is_some() {
                    return Err(StoreError::VersionConflict {
                        expected: content.based_on_version(),
                        found: None,
                    });
                }
                entries.insert(
                    key,
                    StoredEntry {
                        content,
                        protection,
                    },
                );
                Ok(())
            }
            Some((recorded, current_version)) => {
                if recorded != protection {
                    return Err(StoreError::NotAuthorized);
                }
                if content.based_on_version() != Some(current_version) {
                    return Err(StoreError::VersionConflict {
                        expected: content.based_on_version(),
                        found: Some(current_version),
                    });
                }
                entries.insert(
                    key,
                    StoredEntry {
                        content,
                        protection: recorded,
                    },
                );
                Ok(())
            }
        }
    }

    fn apply_remove(
        &self,
        addr: StoreAddr,
        content_key: &str,
        protection: PublicKey,
    ) -> Result<(), StoreError> {
        self.record(OpKind::Remove, &addr, content_key);
        if let Some(error) = self.take_fault(OpKind::Remove, &addr, content_key) {
            return Err(error);
        }

        let mut entries = self.entries.lock();
        let key = (addr, content_key.to_string());
        let recorded = entries.get(&key).map(|entry| entry.protection);
        match recorded {
            None => {
                tracing::debug!("remove of absent key {}/{}", addr, content_key);
                Ok(())
            }
            Some(recorded) if recorded != protection => Err(StoreError::NotAuthorized),
            Some(_) => {
                entries.remove(&key);
                Ok(())
            }
        }
    }
}

/// Resolve an operation on a spawned network task, signaling the waiting
/// caller through a one-shot channel. Exactly one wakeup, no polling.
async fn complete<T, F>(inner: Arc<Inner>, apply: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Inner) -> Result<T, StoreError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if !inner.latency.is_zero() {
            tokio::time::sleep(inner.latency).await;
        }
        let _ = tx.send(apply(&inner));
    });
    rx.await
        .map_err(|_| StoreError::Unreachable("store network task dropped".to_string()))?
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn put(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        content: VersionedContent,
        protection: &SecretKey,
    ) -> Result<(), StoreError> {
        let addr = *addr;
        let content_key = content_key.to_string();
        let protection = protection.public();
        complete(self.inner.clone(), move |inner| {
            inner.apply_put(addr, &content_key, content, protection)
        })
        .await
    }

    async fn get(
        &self,
        addr: &StoreAddr,
        content_key: &str,
    ) -> Result<Option<VersionedContent>, StoreError> {
        let addr = *addr;
        let content_key = content_key.to_string();
        complete(self.inner.clone(), move |inner| {
            inner.apply_get(addr, &content_key)
        })
        .await
    }

    async fn remove(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        protection: &SecretKey,
    ) -> Result<(), StoreError> {
        let addr = *addr;
        let content_key = content_key.to_string();
        let protection = protection.public();
        complete(self.inner.clone(), move |inner| {
            inner.apply_remove(addr, &content_key, protection)
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::content_keys;

    fn addr() -> StoreAddr {
        StoreAddr::from_user_id("test-user")
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = MemoryStore::new();
        let found = store.get(&addr(), content_keys::USER_PROFILE).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let protection = SecretKey::generate();
        let content = VersionedContent::initial(b"v1".to_vec());
        let version = content.version();

        store
            .put(&addr(), content_keys::USER_PROFILE, content, &protection)
            .await
            .unwrap();

        let found = store
            .get(&addr(), content_keys::USER_PROFILE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.payload(), b"v1");
        assert_eq!(found.version(), version);
    }

    #[tokio::test]
    async fn test_cas_guard_rejects_stale_base() {
        let store = MemoryStore::new();
        let protection = SecretKey::generate();

        let first = VersionedContent::initial(b"v1".to_vec());
        let base = first.version();
        store
            .put(&addr(), content_keys::USER_PROFILE, first, &protection)
            .await
            .unwrap();

        // A put based on the current version succeeds
        let second = VersionedContent::based_on(b"v2".to_vec(), base);
        store
            .put(&addr(), content_keys::USER_PROFILE, second, &protection)
            .await
            .unwrap();

        // A put still based on the superseded version is rejected
        let stale = VersionedContent::based_on(b"v2'".to_vec(), base);
        let err = store
            .put(&addr(), content_keys::USER_PROFILE, stale, &protection)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_initial_put_on_existing_key_conflicts() {
        let store = MemoryStore::new();
        let protection = SecretKey::generate();

        store
            .put(
                &addr(),
                content_keys::USER_PROFILE,
                VersionedContent::initial(b"v1".to_vec()),
                &protection,
            )
            .await
            .unwrap();

        let err = store
            .put(
                &addr(),
                content_keys::USER_PROFILE,
                VersionedContent::initial(b"other v1".to_vec()),
                &protection,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_write_protection() {
        let store = MemoryStore::new();
        let owner = SecretKey::generate();
        let intruder = SecretKey::generate();

        let first = VersionedContent::initial(b"v1".to_vec());
        let base = first.version();
        store
            .put(&addr(), content_keys::USER_PROFILE, first, &owner)
            .await
            .unwrap();

        let forged = VersionedContent::based_on(b"evil".to_vec(), base);
        let err = store
            .put(&addr(), content_keys::USER_PROFILE, forged, &intruder)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAuthorized));

        let err = store
            .remove(&addr(), content_keys::USER_PROFILE, &intruder)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAuthorized));

        // The rightful owner can still remove
        store
            .remove(&addr(), content_keys::USER_PROFILE, &owner)
            .await
            .unwrap();
        assert!(store.current(&addr(), content_keys::USER_PROFILE).is_none());
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed_in_order() {
        let store = MemoryStore::new();
        store.fail_next(
            OpKind::Get,
            &addr(),
            content_keys::META_FOLDER,
            StoreError::Unreachable("scripted".to_string()),
        );

        let err = store
            .get(&addr(), content_keys::META_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unreachable(_)));

        // The fault is gone; the next get succeeds (with absence)
        let found = store.get(&addr(), content_keys::META_FOLDER).await.unwrap();
        assert!(found.is_none());
    }
}
