//! Transfer Error Types
//!
//! Every error is fatal to the run that raised it. Lower layers keep their
//! own error enums and convert into [`TransferError`] at the protocol edge.

use thiserror::Error;

use crate::core_types::LinearId;
use crate::identity::IdentityError;
use crate::ledger::{LedgerError, NotaryError};
use crate::network::SessionError;
use crate::obligation::ContractError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Obligation not found: {0}")]
    NotFound(LinearId),

    #[error("{caller} cannot transfer an obligation whose lender is {lender}")]
    Authorization { caller: String, lender: String },

    #[error("Identity resolution failed: {0}")]
    IdentityResolution(String),

    #[error("{0} is neither the borrower nor the new lender")]
    UnknownParty(String),

    #[error("Transaction rejected by the rule engine: {0}")]
    Validation(#[from] ContractError),

    #[error("Signature collection failed: {0}")]
    Signature(String),

    #[error("Notarisation failed: {0}")]
    Notarization(#[from] NotaryError),

    #[error("Obligation {0} is locked by another run")]
    StateLocked(LinearId),

    #[error("Session failure: {0}")]
    Session(#[from] SessionError),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::NotFound(_) => "NOT_FOUND",
            TransferError::Authorization { .. } => "AUTHORIZATION",
            TransferError::IdentityResolution(_) => "IDENTITY_RESOLUTION",
            TransferError::UnknownParty(_) => "UNKNOWN_PARTY",
            TransferError::Validation(_) => "VALIDATION",
            TransferError::Signature(_) => "SIGNATURE",
            TransferError::Notarization(_) => "NOTARIZATION",
            TransferError::StateLocked(_) => "STATE_LOCKED",
            TransferError::Session(_) => "SESSION",
            TransferError::Ledger(_) => "LEDGER",
            TransferError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
        }
    }

    /// Commit service reported that an input was already consumed.
    pub fn is_double_spend(&self) -> bool {
        matches!(self, TransferError::Notarization(e) if e.is_conflict())
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(linear_id) => TransferError::NotFound(linear_id),
            LedgerError::Locked { linear_id, .. } => TransferError::StateLocked(linear_id),
            LedgerError::InvalidSignature(_) | LedgerError::MissingSignatures(_) => {
                TransferError::Signature(e.to_string())
            }
            LedgerError::Encoding(_) | LedgerError::MissingCommand => {
                TransferError::Ledger(e.to_string())
            }
        }
    }
}

impl From<IdentityError> for TransferError {
    fn from(e: IdentityError) -> Self {
        TransferError::IdentityResolution(e.to_string())
    }
}
