use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey};

use super::content::{VersionId, VersionedContent};

/// Size of a store address in bytes
pub const STORE_ADDR_SIZE: usize = 32;

/// Location key for a family of documents in the distributed store
///
/// Documents live under `(StoreAddr, content key)`. An address is derived
/// either from a public key (documents owned by a key pair, e.g. a folder's
/// meta document) or from a user id string (documents that must be findable
/// knowing only the user id, e.g. the profile at registration time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreAddr([u8; STORE_ADDR_SIZE]);

impl StoreAddr {
    /// Derive an address from a user id string.
    pub fn from_user_id(user_id: &str) -> Self {
        Self(*blake3::hash(user_id.as_bytes()).as_bytes())
    }

    /// Convert to a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<&PublicKey> for StoreAddr {
    fn from(key: &PublicKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for StoreAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Addresses show up in nearly every store log line; keep them short
        write!(f, "{}..", &self.to_hex()[..8])
    }
}

/// Errors surfaced by a store backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The operation did not complete within the bounded timeout.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    /// The store could not be reached at all.
    #[error("store unreachable: {0}")]
    Unreachable(String),
    /// The CAS guard rejected the put: the key's current version does not
    /// match the incoming content's base version.
    #[error("version conflict: put based on {expected:?}, store holds {found:?}")]
    VersionConflict {
        expected: Option<VersionId>,
        found: Option<VersionId>,
    },
    /// The presented protection key does not match the one recorded when the
    /// key was created. Authorization failure, not a CAS conflict.
    #[error("write not authorized for this store key")]
    NotAuthorized,
    /// Anything else the backend wants to report.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Async put/get/remove primitive against the distributed store
///
/// This is the boundary to the DHT network layer, which is an external
/// collaborator: routing, replication, and transport live behind it. The
/// contract every backend must honor:
///
/// - `put` is guarded by CAS on the content's `based_on` version and by the
///   protection key recorded at the key's creation
/// - `get` reports an absent key as `Ok(None)`, not as an error
/// - `remove` requires the same protection key as `put`
///
/// Callbacks/completions run on backend-owned tasks; callers get a future
/// that resolves exactly once.
#[async_trait]
pub trait StoreClient: Send + Sync + fmt::Debug + 'static {
    async fn put(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        content: VersionedContent,
        protection: &SecretKey,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        addr: &StoreAddr,
        content_key: &str,
    ) -> Result<Option<VersionedContent>, StoreError>;

    async fn remove(
        &self,
        addr: &StoreAddr,
        content_key: &str,
        protection: &SecretKey,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_addr_from_user_id_is_stable() {
        let a = StoreAddr::from_user_id("alice");
        let b = StoreAddr::from_user_id("alice");
        let c = StoreAddr::from_user_id("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_addr_from_public_key() {
        let key = SecretKey::generate().public();
        let addr = StoreAddr::from(&key);
        assert_eq!(addr.to_hex(), key.to_hex());
    }
}
