use serde::{Deserialize, Serialize};

use super::error::IdentityError;
use super::party::{AnonymousParty, Party};
use crate::crypto::verify_ed25519;

/// Domain separator for pseudonym binding signatures.
const CERTIFICATE_DOMAIN: &[u8] = b"obligation-transfer:identity-certificate:v1\0";

/// Binds a pseudonymous key to the well-known party that minted it.
///
/// The owner signs `(owner name, owner key, pseudonym key)` with its
/// well-known key, so any holder can check the binding without trusting
/// whoever forwarded the certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    pub anonymous: AnonymousParty,
    pub owner: Party,
    signature: Vec<u8>,
}

impl IdentityCertificate {
    pub fn new(owner: Party, anonymous: AnonymousParty, signature: Vec<u8>) -> Self {
        Self {
            anonymous,
            owner,
            signature,
        }
    }

    /// Bytes the owner's well-known key signs.
    pub fn signing_payload(owner: &Party, anonymous: &AnonymousParty) -> Vec<u8> {
        let mut payload = Vec::with_capacity(CERTIFICATE_DOMAIN.len() + owner.name().len() + 65);
        payload.extend_from_slice(CERTIFICATE_DOMAIN);
        payload.extend_from_slice(owner.name().as_bytes());
        payload.push(0);
        payload.extend_from_slice(owner.owning_key().as_bytes());
        payload.extend_from_slice(anonymous.owning_key().as_bytes());
        payload
    }

    pub fn verify(&self) -> Result<(), IdentityError> {
        let payload = Self::signing_payload(&self.owner, &self.anonymous);
        if verify_ed25519(&self.owner.owning_key(), &payload, &self.signature) {
            Ok(())
        } else {
            Err(IdentityError::InvalidCertificate {
                owner: self.owner.name().to_string(),
                anonymous: self.anonymous.owning_key(),
            })
        }
    }
}
