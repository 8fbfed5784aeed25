//! Cryptographic primitives for Burrow
//!
//! This module provides the cryptographic foundation for Burrow's security model:
//!
//! - **Identity & Authentication**: Ed25519 keypairs for client identity and
//!   write protection of store keys
//! - **Encryption**: ChaCha20-Poly1305 for document encryption with per-document secrets
//! - **Hybrid Encryption**: ECDH-wrapped symmetric keys so documents can be
//!   encrypted to a recipient's public key
//!
//! # Security Model
//!
//! ## Client Identity
//! Each client has an Ed25519 keypair (`SecretKey`/`PublicKey`) that serves as its
//! identity in the network. The same kind of keypair doubles as the *protection*
//! key pair authorizing writes to a store key.
//!
//! ## Document Encryption
//! Every encrypted document gets its own ChaCha20-Poly1305 `Secret` key. The
//! hybrid scheme wraps that secret for a recipient:
//! 1. Generate an ephemeral Ed25519 keypair
//! 2. Convert both keys to X25519 (Montgomery curve)
//! 3. Perform ECDH to derive a shared secret
//! 4. Use AES-KW (key wrap) to encrypt the document secret with the shared secret
//! 5. Package as `HybridEncryptedContent` (ephemeral pubkey || wrapped key || ciphertext)
//!
//! The recipient recovers the document secret with their private key and the
//! ephemeral public key, then decrypts the payload.

mod hybrid;
mod keys;
mod secret;

pub use hybrid::{HybridEncryptedContent, HybridError};
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, SecretError, SECRET_SIZE};
