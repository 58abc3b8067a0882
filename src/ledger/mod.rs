//! Ledger primitives
//!
//! - [`transaction`] - state references, commands, wire and signed transactions
//! - [`vault`] - per-node record repository with soft locks and commit waits
//! - [`notary`] - commit service that orders transactions and rejects double spends

pub mod error;
pub mod notary;
pub mod transaction;
pub mod vault;

pub use error::LedgerError;
pub use notary::{CommitService, InMemoryNotary, NotaryError};
pub use transaction::{
    Command, SignedTransaction, StateAndRef, StateRef, TransactionBuilder, TransactionSignature,
    WireTransaction,
};
pub use vault::{SoftLockGuard, Vault};
