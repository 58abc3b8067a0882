use thiserror::Error;

use crate::core_types::{LinearId, RunId};
use crate::crypto::PublicKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transaction encoding failed: {0}")]
    Encoding(String),

    #[error("Transaction has no command")]
    MissingCommand,

    #[error("No unconsumed obligation with linear id {0}")]
    NotFound(LinearId),

    #[error("Obligation {linear_id} is soft-locked by run {holder}")]
    Locked { linear_id: LinearId, holder: RunId },

    #[error("Invalid signature by {0:?}")]
    InvalidSignature(PublicKey),

    #[error("Missing signatures from {0:?}")]
    MissingSignatures(Vec<PublicKey>),
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Encoding(e.to_string())
    }
}
