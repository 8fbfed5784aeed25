//! Hybrid encryption: ECDH-wrapped symmetric keys over ChaCha20-Poly1305
//!
//! Store documents are encrypted to a recipient public key without that
//! recipient's secret ever leaving its client:
//!
//! 1. **Generate document secret**: a fresh ChaCha20-Poly1305 key per document
//! 2. **Encrypt payload**: AEAD-encrypt the payload with the document secret
//! 3. **Wrap**: generate an ephemeral Ed25519 keypair, convert both keys to
//!    X25519, ECDH to a shared secret, AES-KW wrap the document secret
//! 4. **Package**: ephemeral public key || wrapped key || ciphertext
//!
//! Decryption performs the same ECDH from the recipient's side and unwraps
//! the document secret. A wrong recipient key or corrupted content surfaces
//! as a [`HybridError`], never as garbage plaintext.

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Serialize};

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, SECRET_SIZE};

/// Size of AES Key Wrap padding in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Size of the AES-KW wrapped document secret in bytes
pub const WRAPPED_KEY_SIZE: usize = SECRET_SIZE + KW_NONCE_SIZE;

/// Errors that can occur during hybrid encryption or decryption
#[derive(Debug, thiserror::Error)]
pub enum HybridError {
    #[error("hybrid encryption error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// A payload encrypted to a specific recipient's public key
///
/// Only the recipient (whose public key was used during encryption) can
/// recover the payload.
///
/// # Wire Format
///
/// ```text
/// [ ephemeral_pubkey: 32 bytes ][ wrapped_key: 40 bytes ][ ciphertext: variable ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridEncryptedContent {
    ephemeral: [u8; PUBLIC_KEY_SIZE],
    wrapped_key: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl HybridEncryptedContent {
    /// Encrypt a payload for a specific recipient
    ///
    /// Generates a fresh document secret, encrypts the payload with it, and
    /// wraps the secret for the recipient via ephemeral ECDH + AES-KW.
    ///
    /// # Errors
    ///
    /// Returns an error if key conversion or encryption fails.
    pub fn encrypt(payload: &[u8], recipient: &PublicKey) -> Result<Self, HybridError> {
        let document_secret = Secret::generate();
        let ciphertext = document_secret.encrypt(payload)?;

        // Ephemeral ECDH with the recipient
        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public();

        let ephemeral_x25519_private = ephemeral_private.to_x25519();
        let recipient_x25519_public = recipient.to_x25519()?;
        let shared_secret = ephemeral_x25519_private.diffie_hellman(&recipient_x25519_public);

        // Shared secret is the KEK for AES-KW
        let mut shared_secret_bytes = [0; SECRET_SIZE];
        shared_secret_bytes.copy_from_slice(shared_secret.as_bytes());
        let kek = Kek::from(shared_secret_bytes);
        let wrapped_key = kek
            .wrap_vec(document_secret.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        if wrapped_key.len() != WRAPPED_KEY_SIZE {
            return Err(anyhow::anyhow!("wrapped key has unexpected size").into());
        }

        Ok(Self {
            ephemeral: ephemeral_public.to_bytes(),
            wrapped_key,
            ciphertext,
        })
    }

    /// Decrypt the payload with the recipient's secret key
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Key conversion fails
    /// - AES-KW unwrapping fails (wrong recipient key or tampered content)
    /// - Payload authentication or integrity verification fails
    pub fn decrypt(&self, recipient_secret: &SecretKey) -> Result<Vec<u8>, HybridError> {
        let ephemeral_public = PublicKey::from(self.ephemeral);

        let recipient_x25519_private = recipient_secret.to_x25519();
        let ephemeral_x25519_public = ephemeral_public.to_x25519()?;
        let shared_secret = recipient_x25519_private.diffie_hellman(&ephemeral_x25519_public);

        let shared_secret_bytes = *shared_secret.as_bytes();
        let kek = Kek::from(shared_secret_bytes);
        let unwrapped = kek
            .unwrap_vec(&self.wrapped_key)
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;

        if unwrapped.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!("unwrapped secret has wrong size").into());
        }

        let document_secret = Secret::from_slice(&unwrapped)?;
        Ok(document_secret.decrypt(&self.ciphertext)?)
    }

    /// Get the ephemeral public key bytes
    pub fn ephemeral(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.ephemeral
    }

    /// Get the encrypted payload bytes
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hybrid_roundtrip() {
        let recipient = SecretKey::generate();
        let payload = b"a profile document, hypothetically";

        let encrypted = HybridEncryptedContent::encrypt(payload, &recipient.public()).unwrap();
        let decrypted = encrypted.decrypt(&recipient).unwrap();

        assert_eq!(payload.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_hybrid_roundtrip_sizes() {
        // From empty payloads up to well past typical document sizes
        let recipient = SecretKey::generate();
        for size in [0usize, 1, 16, 255, 1024, 64 * 1024] {
            let payload = vec![0xA5u8; size];
            let encrypted =
                HybridEncryptedContent::encrypt(&payload, &recipient.public()).unwrap();
            let decrypted = encrypted.decrypt(&recipient).unwrap();
            assert_eq!(payload, decrypted, "payload size {}", size);
        }
    }

    #[test]
    fn test_hybrid_wrong_recipient() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let encrypted = HybridEncryptedContent::encrypt(b"for alice", &alice.public()).unwrap();

        assert!(encrypted.decrypt(&alice).is_ok());
        assert!(encrypted.decrypt(&bob).is_err());
    }

    #[test]
    fn test_hybrid_tampered_ciphertext() {
        let recipient = SecretKey::generate();
        let mut encrypted =
            HybridEncryptedContent::encrypt(b"some payload bytes", &recipient.public()).unwrap();

        let last = encrypted.ciphertext.len() - 1;
        encrypted.ciphertext[last] ^= 0xFF;

        assert!(encrypted.decrypt(&recipient).is_err());
    }

    #[test]
    fn test_hybrid_serde_roundtrip() {
        let recipient = SecretKey::generate();
        let encrypted =
            HybridEncryptedContent::encrypt(b"wire format check", &recipient.public()).unwrap();

        let binary = bincode::serialize(&encrypted).unwrap();
        let recovered: HybridEncryptedContent = bincode::deserialize(&binary).unwrap();
        assert_eq!(encrypted, recovered);

        let decrypted = recovered.decrypt(&recipient).unwrap();
        assert_eq!(decrypted, b"wire format check".to_vec());
    }
}
