//! The bridge between step bodies and the raw store client
//!
//! A process step awaits a single store operation and nothing else; this is
//! the only suspension point in step execution. `StoreOps` makes that safe:
//!
//! - every operation is bounded by a configured timeout and fails with
//!   [`StoreError::Timeout`] instead of blocking a process forever
//! - an absent key is a value (`Ok(None)`), never an error
//! - content is decrypted immediately after a successful get and encrypted
//!   immediately before a put, so steps only ever observe plaintext

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::{HybridEncryptedContent, HybridError, PublicKey, SecretKey};

use super::client::{StoreAddr, StoreClient, StoreError};
use super::content::{VersionId, VersionedContent};

/// Errors from the bridged (encrypting) store operations
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("decryption failed: {0}")]
    Hybrid(#[from] HybridError),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// A decrypted document together with its version lineage
#[derive(Debug, Clone)]
pub struct Plaintext {
    pub payload: Vec<u8>,
    pub version: VersionId,
    pub based_on: Option<VersionId>,
}

/// Timeout-bounded, encrypting wrapper around a [`StoreClient`]
#[derive(Clone)]
pub struct StoreOps {
    client: Arc<dyn StoreClient>,
    timeout: Duration,
}

impl fmt::Debug for StoreOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOps")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StoreOps {
    pub fn new(client: Arc<dyn StoreClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Get raw versioned content; `Ok(None)` when the key is absent.
    pub async fn get(
        &self,
        addr: &StoreAddr,
        content_key: &str,
    ) -> Result<Option<VersionedContent>, StoreError> {
        self.bounded(self.client.get(addr, content_key)).await
    }

    /// Put raw versioned content, returning the version it was stored as.
    pub async fn put(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        content: VersionedContent,
        protection: &SecretKey,
    ) -> Result<VersionId, StoreError> {
        let version = content.version();
        self.bounded(self.client.put(addr, content_key, content, protection))
            .await?;
        Ok(version)
    }

    /// Remove a key.
    pub async fn remove(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        protection: &SecretKey,
    ) -> Result<(), StoreError> {
        self.bounded(self.client.remove(addr, content_key, protection))
            .await
    }

    /// Get a document stored in the clear (e.g. a public identity document).
    pub async fn get_plain(
        &self,
        addr: &StoreAddr,
        content_key: &str,
    ) -> Result<Option<Plaintext>, StoreError> {
        Ok(self.get(addr, content_key).await?.map(|content| Plaintext {
            version: content.version(),
            based_on: content.based_on_version(),
            payload: content.into_payload(),
        }))
    }

    /// Put a document in the clear.
    pub async fn put_plain(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        payload: Vec<u8>,
        based_on: Option<VersionId>,
        protection: &SecretKey,
    ) -> Result<VersionId, StoreError> {
        self.put(
            addr,
            content_key,
            VersionedContent::new(payload, based_on),
            protection,
        )
        .await
    }

    /// Get and decrypt a document encrypted to `recipient`'s key pair.
    ///
    /// The payload a caller observes is always plaintext; decryption failure
    /// is fatal for the operation that asked, never retried here.
    pub async fn get_decrypted(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        recipient: &SecretKey,
    ) -> Result<Option<Plaintext>, OpsError> {
        let content = match self.get(addr, content_key).await? {
            Some(content) => content,
            None => return Ok(None),
        };

        let version = content.version();
        let based_on = content.based_on_version();
        let encrypted: HybridEncryptedContent = bincode::deserialize(content.payload())?;
        let payload = encrypted.decrypt(recipient)?;

        tracing::debug!(
            "decrypted {}/{} at version {}",
            addr,
            content_key,
            version
        );

        Ok(Some(Plaintext {
            payload,
            version,
            based_on,
        }))
    }

    /// Encrypt a document to `recipient` and put it, returning the new version.
    pub async fn put_encrypted(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        payload: &[u8],
        based_on: Option<VersionId>,
        recipient: &PublicKey,
        protection: &SecretKey,
    ) -> Result<VersionId, OpsError> {
        let encrypted = HybridEncryptedContent::encrypt(payload, recipient)?;
        let wire = bincode::serialize(&encrypted)?;
        Ok(self
            .put(
                addr,
                content_key,
                VersionedContent::new(wire, based_on),
                protection,
            )
            .await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{content_keys, MemoryStore};

    use async_trait::async_trait;

    /// A store whose operations never resolve.
    #[derive(Debug)]
    struct StalledStore;

    #[async_trait]
    impl StoreClient for StalledStore {
        async fn put(
            &self,
            _addr: &StoreAddr,
            _content_key: &str,
            _content: VersionedContent,
            _protection: &SecretKey,
        ) -> Result<(), StoreError> {
            futures::future::pending().await
        }

        async fn get(
            &self,
            _addr: &StoreAddr,
            _content_key: &str,
        ) -> Result<Option<VersionedContent>, StoreError> {
            futures::future::pending().await
        }

        async fn remove(
            &self,
            _addr: &StoreAddr,
            _content_key: &str,
            _protection: &SecretKey,
        ) -> Result<(), StoreError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let ops = StoreOps::new(Arc::new(StalledStore), Duration::from_millis(20));
        let addr = StoreAddr::from_user_id("nobody");

        let err = ops.get(&addr, content_keys::USER_PROFILE).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_encrypted_roundtrip() {
        let store = MemoryStore::new();
        let ops = StoreOps::new(Arc::new(store), Duration::from_secs(1));

        let recipient = SecretKey::generate();
        let protection = SecretKey::generate();
        let addr = StoreAddr::from(&recipient.public());

        let version = ops
            .put_encrypted(
                &addr,
                content_keys::META_FOLDER,
                b"folder listing",
                None,
                &recipient.public(),
                &protection,
            )
            .await
            .unwrap();

        let plaintext = ops
            .get_decrypted(&addr, content_keys::META_FOLDER, &recipient)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plaintext.payload, b"folder listing");
        assert_eq!(plaintext.version, version);
        assert!(plaintext.based_on.is_none());
    }

    #[tokio::test]
    async fn test_decrypt_with_wrong_key_fails() {
        let store = MemoryStore::new();
        let ops = StoreOps::new(Arc::new(store), Duration::from_secs(1));

        let recipient = SecretKey::generate();
        let wrong = SecretKey::generate();
        let protection = SecretKey::generate();
        let addr = StoreAddr::from(&recipient.public());

        ops.put_encrypted(
            &addr,
            content_keys::META_FOLDER,
            b"secret listing",
            None,
            &recipient.public(),
            &protection,
        )
        .await
        .unwrap();

        let err = ops
            .get_decrypted(&addr, content_keys::META_FOLDER, &wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Hybrid(_)));
    }

    #[tokio::test]
    async fn test_absence_is_a_value() {
        let store = MemoryStore::new();
        let ops = StoreOps::new(Arc::new(store), Duration::from_secs(1));
        let recipient = SecretKey::generate();
        let addr = StoreAddr::from_user_id("nobody");

        let found = ops
            .get_decrypted(&addr, content_keys::USER_PROFILE, &recipient)
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
