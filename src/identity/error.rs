use thiserror::Error;

use crate::crypto::PublicKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Certificate signature for {anonymous:?} does not verify against {owner}")]
    InvalidCertificate { owner: String, anonymous: PublicKey },

    #[error("Certificate owner {name} does not match the well-known key on record")]
    OwnerMismatch { name: String },

    #[error("Certificate owner {0} is not on the network map")]
    UnknownOwner(String),

    #[error("Cannot resolve party with key {0:?}")]
    Unresolvable(PublicKey),

    #[error("No private key held for {0:?}")]
    MissingKey(PublicKey),
}
