//! Obligation state
//!
//! A debt of `amount` owed by `borrower` to `lender`. Versions of the same
//! logical obligation share a [`LinearId`]; a transfer consumes one version
//! and produces the next with a different lender.

pub mod contract;
pub mod schema;

pub use contract::{Contract, ContractError, ObligationCommand, ObligationContract};
pub use schema::{MigrationReport, ObligationIndex, PersistentObligation, SchemaVersion};

use serde::{Deserialize, Serialize};

use crate::core_types::{Amount, LinearId};
use crate::crypto::PublicKey;
use crate::identity::AbstractParty;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub lender: AbstractParty,
    pub borrower: AbstractParty,
    pub amount: Amount,
    pub linear_id: LinearId,
}

impl Obligation {
    /// New obligation with a fresh linear id.
    pub fn new(lender: AbstractParty, borrower: AbstractParty, amount: Amount) -> Self {
        Self {
            lender,
            borrower,
            amount,
            linear_id: LinearId::new(),
        }
    }

    pub fn participants(&self) -> [&AbstractParty; 2] {
        [&self.lender, &self.borrower]
    }

    pub fn participant_keys(&self) -> Vec<PublicKey> {
        vec![self.lender.owning_key(), self.borrower.owning_key()]
    }

    /// Next version of this obligation, owed to `new_lender`.
    pub fn with_new_lender(&self, new_lender: AbstractParty) -> Self {
        Self {
            lender: new_lender,
            ..self.clone()
        }
    }
}
