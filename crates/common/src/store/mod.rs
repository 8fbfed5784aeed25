//! # Store
//!
//! The distributed store interface and the pieces layered directly on it:
//!
//! - [`VersionedContent`] - the unit stored under a key: payload, version id,
//!   and the based-on predecessor id that the store's CAS guard checks
//! - [`StoreClient`] - the async put/get/remove primitive against the DHT,
//!   an external collaborator consumed behind a trait
//! - [`MemoryStore`] - in-process backend honoring the full contract (CAS,
//!   write protection, simulated network tasks, fault injection)
//! - [`StoreOps`] - the bridge steps actually call: bounded timeouts,
//!   encrypt-before-put / decrypt-after-get, absence as a value
//!
//! The store itself never sees plaintext; everything above [`StoreOps`]
//! never sees ciphertext.

mod client;
mod content;
mod memory;
mod ops;

pub use client::{StoreAddr, StoreClient, StoreError};
pub use content::{VersionId, VersionedContent};
pub use memory::{MemoryStore, OpKind, OpRecord};
pub use ops::{OpsError, Plaintext, StoreOps};

/// Well-known content keys under a store address.
pub mod content_keys {
    /// The user's encrypted profile document.
    pub const USER_PROFILE: &str = "user-profile";
    /// The user's public identity document (stored in the clear).
    pub const USER_PUBLIC_KEY: &str = "user-public-key";
    /// A folder's meta document, stored under the folder's own key pair.
    pub const META_FOLDER: &str = "meta-folder";
}
