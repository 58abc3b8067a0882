//! Obligation rule engine
//!
//! Decides whether a proposed transaction is a well-formed issue or
//! transfer of an obligation. Every party runs the same checks before
//! signing, and the initiator runs them before asking anyone to sign.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::crypto::PublicKey;
use crate::ledger::WireTransaction;

/// Authorisation command attached to an obligation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObligationCommand {
    Issue,
    Transfer,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("{command:?} expects {expected} input(s), found {found}")]
    InputCount {
        command: ObligationCommand,
        expected: usize,
        found: usize,
    },

    #[error("{command:?} expects {expected} output(s), found {found}")]
    OutputCount {
        command: ObligationCommand,
        expected: usize,
        found: usize,
    },

    #[error("Obligation amount must be greater than zero")]
    ZeroAmount,

    #[error("Lender and borrower cannot be the same party")]
    SameParty,

    #[error("Transfer cannot change the obligation amount")]
    AmountChanged,

    #[error("Transfer cannot change the borrower")]
    BorrowerChanged,

    #[error("Transfer cannot change the linear id")]
    LinearIdChanged,

    #[error("Transfer must change the lender")]
    LenderUnchanged,

    #[error("Required signers mismatch: expected {expected:?}, command names {found:?}")]
    SignersMismatch {
        expected: Vec<PublicKey>,
        found: Vec<PublicKey>,
    },
}

/// Rule engine seam.
pub trait Contract: Send + Sync {
    fn verify(&self, tx: &WireTransaction) -> Result<(), ContractError>;
}

/// Rules for [`ObligationCommand::Issue`] and [`ObligationCommand::Transfer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ObligationContract;

impl ObligationContract {
    fn verify_issue(tx: &WireTransaction) -> Result<(), ContractError> {
        let command = ObligationCommand::Issue;
        if !tx.inputs().is_empty() {
            return Err(ContractError::InputCount {
                command,
                expected: 0,
                found: tx.inputs().len(),
            });
        }
        let [output] = tx.outputs() else {
            return Err(ContractError::OutputCount {
                command,
                expected: 1,
                found: tx.outputs().len(),
            });
        };

        if output.amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        if output.lender.owning_key() == output.borrower.owning_key() {
            return Err(ContractError::SameParty);
        }

        check_signers(tx, output.participant_keys())
    }

    fn verify_transfer(tx: &WireTransaction) -> Result<(), ContractError> {
        let command = ObligationCommand::Transfer;
        let [input] = tx.inputs() else {
            return Err(ContractError::InputCount {
                command,
                expected: 1,
                found: tx.inputs().len(),
            });
        };
        let [output] = tx.outputs() else {
            return Err(ContractError::OutputCount {
                command,
                expected: 1,
                found: tx.outputs().len(),
            });
        };
        let input = &input.state;

        if output.amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        if output.amount != input.amount {
            return Err(ContractError::AmountChanged);
        }
        if output.borrower != input.borrower {
            return Err(ContractError::BorrowerChanged);
        }
        if output.linear_id != input.linear_id {
            return Err(ContractError::LinearIdChanged);
        }
        if output.lender.owning_key() == input.lender.owning_key() {
            return Err(ContractError::LenderUnchanged);
        }

        let mut expected = input.participant_keys();
        expected.push(output.lender.owning_key());
        check_signers(tx, expected)
    }
}

impl Contract for ObligationContract {
    fn verify(&self, tx: &WireTransaction) -> Result<(), ContractError> {
        match tx.command().kind {
            ObligationCommand::Issue => Self::verify_issue(tx),
            ObligationCommand::Transfer => Self::verify_transfer(tx),
        }
    }
}

fn check_signers(tx: &WireTransaction, expected: Vec<PublicKey>) -> Result<(), ContractError> {
    let expected: BTreeSet<PublicKey> = expected.into_iter().collect();
    let found: BTreeSet<PublicKey> = tx.command().signers.iter().copied().collect();
    if expected != found {
        return Err(ContractError::SignersMismatch {
            expected: expected.into_iter().collect(),
            found: found.into_iter().collect(),
        });
    }
    Ok(())
}
