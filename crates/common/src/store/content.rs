use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a version identifier in bytes
pub const VERSION_ID_SIZE: usize = 16;

/// Opaque identifier for one version of a stored document
///
/// Generated fresh by a writer for each put attempt. The store compares the
/// `based_on` of an incoming put against the version it currently holds; the
/// id itself carries no ordering, it only has to be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId([u8; VERSION_ID_SIZE]);

impl VersionId {
    /// Generate a new random version identifier
    pub fn generate() -> Self {
        let mut buff = [0; VERSION_ID_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Convert to a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; VERSION_ID_SIZE]> for VersionId {
    fn from(bytes: [u8; VERSION_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

/// A payload plus its version lineage; the unit stored under a store key
///
/// Immutable once constructed. A writer never mutates a `VersionedContent`
/// on retry; it builds a fresh one against the re-fetched base.
///
/// The store accepts a put of content `V` only if its current version for
/// that key equals `V.based_on` (or the key is absent and `based_on` is
/// `None`) - the CAS guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedContent {
    payload: Vec<u8>,
    version: VersionId,
    based_on: Option<VersionId>,
}

impl VersionedContent {
    /// Create the first version of a document (no predecessor).
    pub fn initial(payload: Vec<u8>) -> Self {
        Self {
            payload,
            version: VersionId::generate(),
            based_on: None,
        }
    }

    /// Create a successor version based on a previously fetched version.
    pub fn based_on(payload: Vec<u8>, base: VersionId) -> Self {
        Self {
            payload,
            version: VersionId::generate(),
            based_on: Some(base),
        }
    }

    /// Create a version with an explicit (possibly absent) predecessor.
    pub fn new(payload: Vec<u8>, based_on: Option<VersionId>) -> Self {
        Self {
            payload,
            version: VersionId::generate(),
            based_on,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn version(&self) -> VersionId {
        self.version
    }

    pub fn based_on_version(&self) -> Option<VersionId> {
        self.based_on
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_version_ids_are_unique() {
        let a = VersionId::generate();
        let b = VersionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_initial_has_no_predecessor() {
        let content = VersionedContent::initial(b"v1".to_vec());
        assert!(content.based_on_version().is_none());
        assert_eq!(content.payload(), b"v1");
    }

    #[test]
    fn test_successor_links_to_base() {
        let first = VersionedContent::initial(b"v1".to_vec());
        let second = VersionedContent::based_on(b"v2".to_vec(), first.version());

        assert_eq!(second.based_on_version(), Some(first.version()));
        assert_ne!(second.version(), first.version());
    }

    #[test]
    fn test_serde_roundtrip() {
        let content = VersionedContent::based_on(b"payload".to_vec(), VersionId::generate());
        let bytes = bincode::serialize(&content).unwrap();
        let decoded: VersionedContent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(content, decoded);
    }
}
