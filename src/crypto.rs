//! Ed25519 keys and signatures for parties, pseudonyms and the notary.
//!
//! Only public keys travel between nodes. Signing keys never leave the
//! [`KeyStore`](crate::identity::KeyStore) of the node that generated them.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex chars, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

/// Ed25519 signing key plus its public half.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key pair, for reproducible identities in tests and demos.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature.
///
/// Returns `false` for malformed keys or signatures instead of erroring;
/// callers only care whether the signature is acceptable.
pub fn verify_ed25519(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    // Signature must be exactly 64 bytes
    let sig_bytes: [u8; 64] = match signature.try_into() {
        Ok(b) => b,
        Err(_) => return false,
    };

    let verifying_key = match VerifyingKey::from_bytes(public_key.as_bytes()) {
        Ok(k) => k,
        Err(_) => return false,
    };

    let sig = Signature::from_bytes(&sig_bytes);

    verifying_key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_valid_signature() {
        let key = KeyPair::generate();
        let message = b"transfer obligation";
        let signature = key.sign(message);

        assert!(verify_ed25519(&key.public(), message, &signature));
    }

    #[test]
    fn test_verify_invalid_signature() {
        let key = KeyPair::generate();
        assert!(!verify_ed25519(&key.public(), b"message", &[0u8; 64]));
    }

    #[test]
    fn test_verify_wrong_message() {
        let key = KeyPair::generate();
        let signature = key.sign(b"message");

        assert!(!verify_ed25519(&key.public(), b"other message", &signature));
    }

    #[test]
    fn test_verify_wrong_key() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = key.sign(b"message");

        assert!(!verify_ed25519(&other.public(), b"message", &signature));
    }

    #[test]
    fn test_invalid_signature_length() {
        let key = KeyPair::generate();

        assert!(!verify_ed25519(&key.public(), b"message", &[0u8; 32]));
        assert!(!verify_ed25519(&key.public(), b"message", &[0u8; 128]));
    }

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public(), b.public());
        assert_ne!(a.public(), KeyPair::from_seed([8u8; 32]).public());
    }
}
